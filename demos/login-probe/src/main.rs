//! Logs in to a game server and reports room activity until the server
//! hangs up or Ctrl-C is pressed.
//!
//! ```text
//! TANKWIRE_USER=ana TANKWIRE_PASSWORD=hunter2 RUST_LOG=debug \
//!     cargo run -p login-probe -- application.properties
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tankwire::prelude::*;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ---------------------------------------------------------------------------
// Game messages
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    player_id: u64,
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct RoomEvent {
    room_id: u32,
    player_id: u64,
}

#[derive(Debug)]
enum GameMessage {
    Login(LoginResponse),
    PlayerJoined(RoomEvent),
    PlayerLeft(RoomEvent),
    GameStarted(serde_json::Value),
}

fn parsers() -> ParserTable<GameMessage> {
    ParserTable::new()
        .register_json(Opcode::Login, GameMessage::Login)
        .register_json(Opcode::PlayerJoinRoom, GameMessage::PlayerJoined)
        .register_json(Opcode::PlayerLeaveRoom, GameMessage::PlayerLeft)
        .register_json(Opcode::GameStarted, GameMessage::GameStarted)
}

fn log_room_event(message: &DecodedResponse<GameMessage>) -> Result<(), SubscriberError> {
    match &message.payload {
        Some(GameMessage::PlayerJoined(e)) => {
            tracing::info!(room_id = e.room_id, player_id = e.player_id, "player joined");
        }
        Some(GameMessage::PlayerLeft(e)) => {
            tracing::info!(room_id = e.room_id, player_id = e.player_id, "player left");
        }
        Some(GameMessage::GameStarted(details)) => {
            tracing::info!(%details, "game started");
        }
        Some(GameMessage::Login(_)) | None => {
            return Err(SubscriberError::new(format!(
                "unexpected {} broadcast (status {})",
                message.opcode, message.status
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    tracing::info!(addr = %config.addr(), "connecting");
    let client = GameClient::connect(config, parsers()).await?;

    let closed = Arc::new(Notify::new());
    {
        let closed = Arc::clone(&closed);
        client.on_disconnect(move |reason| {
            tracing::info!(%reason, "connection closed");
            closed.notify_one();
        });
    }
    let room_events: Arc<dyn Subscriber<GameMessage>> = Arc::new(log_room_event);
    for opcode in [Opcode::PlayerJoinRoom, Opcode::PlayerLeaveRoom, Opcode::GameStarted] {
        client.subscribe(opcode, Arc::clone(&room_events));
    }

    let login = LoginRequest {
        username: std::env::var("TANKWIRE_USER").unwrap_or_else(|_| "guest".into()),
        password: std::env::var("TANKWIRE_PASSWORD").unwrap_or_default(),
    };
    let response = client.request(Opcode::Login, &login).await?;
    match response.payload {
        Some(GameMessage::Login(me)) => {
            tracing::info!(player_id = me.player_id, nickname = %me.nickname, "logged in");
        }
        _ => {
            tracing::error!(
                status = %response.status,
                reason = response.error_message.as_deref().unwrap_or("no payload"),
                "login rejected"
            );
            return Ok(());
        }
    }

    tokio::select! {
        _ = closed.notified() => {}
        _ = tokio::signal::ctrl_c() => client.close(),
    }
    Ok(())
}

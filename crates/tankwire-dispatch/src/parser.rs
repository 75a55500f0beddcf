//! Per-opcode payload parsers.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use tankwire_protocol::{Codec, JsonCodec, Opcode, ProtocolError};

/// Turns a payload's raw bytes into the application's message type.
pub type ParseFn<M> = Box<dyn Fn(&[u8]) -> Result<M, ProtocolError> + Send + Sync>;

/// Which parser handles which opcode.
///
/// Built once before connecting and read-only afterwards:
///
/// ```rust
/// use serde::Deserialize;
/// use tankwire_dispatch::ParserTable;
/// use tankwire_protocol::Opcode;
///
/// #[derive(Deserialize)]
/// struct LoginResponse { player_id: u64 }
///
/// enum GameMessage { Login(LoginResponse) }
///
/// let parsers = ParserTable::new()
///     .register_json(Opcode::Login, GameMessage::Login);
/// assert!(parsers.contains(Opcode::Login));
/// ```
pub struct ParserTable<M> {
    parsers: HashMap<Opcode, ParseFn<M>>,
}

impl<M> ParserTable<M> {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registers `parse` for `opcode`, replacing any earlier parser.
    pub fn register<F>(mut self, opcode: Opcode, parse: F) -> Self
    where
        F: Fn(&[u8]) -> Result<M, ProtocolError> + Send + Sync + 'static,
    {
        if self.parsers.insert(opcode, Box::new(parse)).is_some() {
            tracing::debug!(%opcode, "replaced payload parser");
        }
        self
    }

    /// Registers a parser that decodes `T` with `codec` and wraps it.
    pub fn register_decoded<C, T, W>(self, opcode: Opcode, codec: C, wrap: W) -> Self
    where
        C: Codec + Send + Sync + 'static,
        T: DeserializeOwned,
        W: Fn(T) -> M + Send + Sync + 'static,
    {
        self.register(opcode, move |bytes| codec.decode::<T>(bytes).map(&wrap))
    }

    /// Registers a JSON parser for `T`, usually an enum variant constructor.
    pub fn register_json<T, W>(self, opcode: Opcode, wrap: W) -> Self
    where
        T: DeserializeOwned,
        W: Fn(T) -> M + Send + Sync + 'static,
    {
        self.register_decoded(opcode, JsonCodec, wrap)
    }

    pub fn contains(&self, opcode: Opcode) -> bool {
        self.parsers.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// Runs the parser for `opcode`. `None` means no parser is registered.
    pub fn parse(&self, opcode: Opcode, payload: &[u8]) -> Option<Result<M, ProtocolError>> {
        self.parsers.get(&opcode).map(|parse| parse(payload))
    }
}

impl<M> Default for ParserTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for ParserTable<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.parsers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Chat {
        from: String,
        text: String,
    }

    #[derive(Debug, PartialEq)]
    enum Msg {
        Chat(Chat),
        Raw(Vec<u8>),
    }

    #[test]
    fn test_json_parser_wraps_decoded_value() {
        let parsers = ParserTable::new().register_json(Opcode::Chat, Msg::Chat);

        let parsed = parsers
            .parse(Opcode::Chat, br#"{"from":"ana","text":"gg"}"#)
            .expect("parser registered")
            .expect("valid json");

        assert_eq!(
            parsed,
            Msg::Chat(Chat {
                from: "ana".into(),
                text: "gg".into()
            })
        );
    }

    #[test]
    fn test_missing_parser_returns_none() {
        let parsers: ParserTable<Msg> = ParserTable::new();
        assert!(parsers.parse(Opcode::Chat, b"{}").is_none());
        assert!(parsers.is_empty());
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let parsers = ParserTable::new().register_json(Opcode::Chat, Msg::Chat);

        let result = parsers.parse(Opcode::Chat, b"not json").unwrap();

        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_custom_parser_and_replacement() {
        let parsers = ParserTable::new()
            .register(Opcode::GameTick, |_| Ok(Msg::Raw(vec![0])))
            .register(Opcode::GameTick, |bytes| Ok(Msg::Raw(bytes.to_vec())));

        assert_eq!(parsers.len(), 1);
        assert_eq!(
            parsers.parse(Opcode::GameTick, &[1, 2]).unwrap().unwrap(),
            Msg::Raw(vec![1, 2])
        );
    }
}

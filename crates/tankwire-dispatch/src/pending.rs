//! Requests waiting for a correlated response.

use std::collections::HashMap;

use parking_lot::Mutex;
use tankwire_protocol::{Opcode, RequestId};
use tokio::sync::oneshot;

use crate::{DecodedResponse, DispatchError};

pub(crate) type Outcome<M> = Result<DecodedResponse<M>, DispatchError>;

/// The waiter half of a pending request, handed to whoever removed it.
pub(crate) struct Waiter<M> {
    pub opcode: Opcode,
    pub tx: oneshot::Sender<Outcome<M>>,
    ticket: u64,
}

/// Identifies one registration of a request id. A reused id gets a new
/// ticket, so the earlier request can no longer remove the later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub id: RequestId,
    seq: u64,
}

/// Pending requests keyed by id.
///
/// Removal is the only way to get at a waiter, and removal happens under
/// the lock, so of a response, a timeout and a disconnect racing for the
/// same id exactly one wins.
pub(crate) struct PendingTable<M> {
    entries: Mutex<Entries<M>>,
}

struct Entries<M> {
    by_id: HashMap<RequestId, Waiter<M>>,
    next_seq: u64,
}

impl<M> PendingTable<M> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                by_id: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Registers a request and returns its ticket and the receiver its
    /// response lands on.
    pub fn insert(&self, id: RequestId, opcode: Opcode) -> (Ticket, oneshot::Receiver<Outcome<M>>) {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.lock();
        let seq = entries.next_seq;
        entries.next_seq += 1;
        let displaced = entries.by_id.insert(id, Waiter { opcode, tx, ticket: seq });
        drop(entries);

        if let Some(old) = displaced {
            // Only possible if a request outlived a full id cycle. Its
            // receiver sees a closed channel.
            tracing::warn!(%id, opcode = %old.opcode, "request id reused while still pending");
        }
        (Ticket { id, seq }, rx)
    }

    /// Removes and returns the waiter for `id`, if it is still pending.
    pub fn take(&self, id: RequestId) -> Option<Waiter<M>> {
        self.entries.lock().by_id.remove(&id)
    }

    /// Removes the entry registered under `ticket` without resolving it.
    /// Returns `false` if it was already claimed or has been displaced by a
    /// later request with the same id.
    pub fn remove(&self, ticket: Ticket) -> bool {
        let mut entries = self.entries.lock();
        match entries.by_id.get(&ticket.id) {
            Some(waiter) if waiter.ticket == ticket.seq => {
                entries.by_id.remove(&ticket.id);
                true
            }
            _ => false,
        }
    }

    /// Removes every entry.
    pub fn drain(&self) -> Vec<(RequestId, Waiter<M>)> {
        self.entries.lock().by_id.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;

    #[test]
    fn test_take_removes_entry_once() {
        let table: PendingTable<()> = PendingTable::new();
        let (_, _rx) = table.insert(RequestId(7), Opcode::Login);

        let waiter = table.take(RequestId(7)).expect("pending");
        assert_eq!(waiter.opcode, Opcode::Login);
        assert!(table.take(RequestId(7)).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_remove_after_take_is_false() {
        let table: PendingTable<()> = PendingTable::new();
        let (ticket, _rx) = table.insert(RequestId(1), Opcode::Login);

        assert!(table.take(RequestId(1)).is_some());
        assert!(!table.remove(ticket));
    }

    #[test]
    fn test_drain_empties_table() {
        let table: PendingTable<()> = PendingTable::new();
        let _a = table.insert(RequestId(1), Opcode::Login);
        let _b = table.insert(RequestId(2), Opcode::JoinRoom);

        let drained = table.drain();

        assert_eq!(drained.len(), 2);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_reused_id_closes_displaced_receiver() {
        let table: PendingTable<()> = PendingTable::new();
        let (_, mut old) = table.insert(RequestId(3), Opcode::Login);
        let _new = table.insert(RequestId(3), Opcode::Chat);

        assert!(old.try_recv().is_err());
        assert_eq!(table.take(RequestId(3)).unwrap().opcode, Opcode::Chat);
    }

    #[test]
    fn test_displaced_ticket_cannot_remove_newer_entry() {
        let table: PendingTable<()> = PendingTable::new();
        let (old, _old_rx) = table.insert(RequestId(3), Opcode::Login);
        let (new, _new_rx) = table.insert(RequestId(3), Opcode::Chat);

        assert!(!table.remove(old));
        assert_eq!(table.len(), 1);
        assert!(table.remove(new));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_response_and_timeout_race_has_one_winner() {
        for _ in 0..200 {
            let table: Arc<PendingTable<()>> = Arc::new(PendingTable::new());
            let (ticket, _rx) = table.insert(RequestId(11), Opcode::Login);
            let start = Arc::new(Barrier::new(2));

            let racers: Vec<_> = (0..2)
                .map(|_| {
                    let table = Arc::clone(&table);
                    let start = Arc::clone(&start);
                    std::thread::spawn(move || {
                        start.wait();
                        table.remove(ticket)
                    })
                })
                .collect();

            let wins = racers
                .into_iter()
                .map(|racer| racer.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(wins, 1);
            assert_eq!(table.len(), 0);
        }
    }
}

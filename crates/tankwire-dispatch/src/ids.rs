//! Cyclic request id allocation.

use std::sync::atomic::{AtomicU32, Ordering};

use tankwire_protocol::RequestId;

/// Ids below `u32::MAX` kept out of circulation.
pub const RESERVED_GAP: u32 = 100_000;

/// Largest id ever handed out.
pub const SAFE_MAX: u32 = u32::MAX - RESERVED_GAP;

/// Hands out correlated request ids in `[1, ceiling]`, wrapping to `1`.
///
/// Lock-free and shareable across threads. Any window of fewer than
/// `ceiling` consecutive allocations contains no duplicates, which is far
/// more than can be in flight before their timeouts expire.
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: AtomicU32,
    ceiling: u32,
}

impl RequestIdAllocator {
    pub fn new() -> Self {
        Self::with_ceiling(SAFE_MAX)
    }

    /// An allocator that wraps after `ceiling`, clamped to `[1, SAFE_MAX]`.
    pub fn with_ceiling(ceiling: u32) -> Self {
        Self {
            next: AtomicU32::new(1),
            ceiling: ceiling.clamp(1, SAFE_MAX),
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Returns the next id. Never returns [`RequestId::BROADCAST`].
    pub fn next_id(&self) -> RequestId {
        let ceiling = self.ceiling;
        let issued = match self.next.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| Some(if current >= ceiling { 1 } else { current + 1 }),
        ) {
            Ok(id) | Err(id) => id,
        };
        if issued == ceiling {
            tracing::debug!(ceiling, "request id counter wrapped to 1");
        }
        RequestId(issued)
    }
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_first_id_is_one() {
        let ids = RequestIdAllocator::new();
        assert_eq!(ids.next_id(), RequestId(1));
        assert_eq!(ids.next_id(), RequestId(2));
    }

    #[test]
    fn test_wraps_to_one_after_ceiling() {
        let ids = RequestIdAllocator::with_ceiling(3);
        let issued: Vec<u32> = (0..7).map(|_| ids.next_id().get()).collect();
        assert_eq!(issued, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn test_ceiling_is_clamped() {
        assert_eq!(RequestIdAllocator::with_ceiling(0).ceiling(), 1);
        assert_eq!(RequestIdAllocator::with_ceiling(u32::MAX).ceiling(), SAFE_MAX);

        let single = RequestIdAllocator::with_ceiling(0);
        assert_eq!(single.next_id(), RequestId(1));
        assert_eq!(single.next_id(), RequestId(1));
    }

    #[test]
    fn test_default_ceiling_leaves_reserved_gap() {
        assert_eq!(SAFE_MAX, 4_294_867_295);
        assert_eq!(RequestIdAllocator::default().ceiling(), SAFE_MAX);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let ids = Arc::new(RequestIdAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..1_000).map(|_| ids.next_id().get()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id >= 1);
                assert!(seen.insert(id), "id {id} issued twice");
            }
        }
        assert_eq!(seen.len(), 8_000);
    }

    #[test]
    fn test_concurrent_allocation_across_wrap_stays_in_range() {
        let ids = Arc::new(RequestIdAllocator::with_ceiling(100));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..25).map(|_| ids.next_id().get()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!((1..=100).contains(&id));
                seen.insert(id);
            }
        }
        // Exactly one full cycle: every id once.
        assert_eq!(seen.len(), 100);
    }
}

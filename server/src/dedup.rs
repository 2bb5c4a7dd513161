//! Deduplicator: a per-connection bounded set of recently seen `msgId`s.
//! Owned by the connection task itself rather than threaded through
//! `AppState` — it's scoped per socket-id and drops on close, which is
//! exactly a value's lifetime if it lives on the connection task's stack.
//! Backed by `lru`, already in the pack's dependency set
//! (`signal-fish-server`'s manifest) for the same "bounded recently-seen
//! set" shape.

use std::num::NonZeroUsize;

use lru::LruCache;

const CAPACITY: usize = 100;

pub struct Deduplicator {
    seen: LruCache<String, ()>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Deduplicator {
            seen: LruCache::new(NonZeroUsize::new(CAPACITY).expect("capacity is nonzero")),
        }
    }
}

impl Deduplicator {
    /// Returns `true` iff `msg_id` was already seen, inserting it either way
    /// so the very first observation is recorded.
    pub fn is_duplicate(&mut self, msg_id: &str) -> bool {
        if self.seen.contains(msg_id) {
            self.seen.promote(msg_id);
            true
        } else {
            self.seen.put(msg_id.to_string(), ());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_not_a_duplicate() {
        let mut dedup = Deduplicator::default();
        assert!(!dedup.is_duplicate("m1"));
    }

    #[test]
    fn repeat_observation_is_a_duplicate() {
        let mut dedup = Deduplicator::default();
        assert!(!dedup.is_duplicate("m1"));
        assert!(dedup.is_duplicate("m1"));
        assert!(dedup.is_duplicate("m1"));
    }

    #[test]
    fn eviction_beyond_capacity_forgets_oldest() {
        let mut dedup = Deduplicator::default();
        for i in 0..CAPACITY {
            assert!(!dedup.is_duplicate(&format!("m{i}")));
        }
        // m0 is now the least-recently-used entry and gets evicted by m_cap.
        assert!(!dedup.is_duplicate("m_cap"));
        assert!(!dedup.is_duplicate("m0"));
    }
}

//! Gossip de-duplication cache (§4.8): every relayed message carries a
//! hop count; a message is re-broadcast to `FAN_OUT` peers at most
//! `MAX_ROUNDS` times and is dropped once its `dedup_key` has already
//! been seen, regardless of hop count.
//!
//! The teacher's `network/dedup_filter.rs` reaches for a Bloom filter,
//! but notes in its own doc comment that the live path actually uses
//! HashSet-based dedup instead. Since hop aging needs per-message state
//! (not just membership), this cache is exact: a bounded map from
//! dedup key to the round it was first seen at.

use crate::types::Hash256;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const FAN_OUT: usize = 3;
pub const MAX_ROUNDS: u8 = 10;

/// How long a seen entry is retained before it ages out of the cache,
/// bounding memory independent of message volume.
const ENTRY_TTL: Duration = Duration::from_secs(60);

struct Seen {
    hop: u8,
    first_seen: Instant,
}

/// Tracks which gossip messages this node has already relayed, and how
/// many hops each has traveled.
pub struct DedupCache {
    seen: Mutex<HashMap<Hash256, Seen>>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record a message at the given hop count. Returns `true` if this is
    /// the first time the key has been observed (i.e. it should be
    /// relayed onward, provided `hop < MAX_ROUNDS`); `false` if it is a
    /// duplicate and must be dropped.
    pub fn observe(&self, key: Hash256, hop: u8) -> bool {
        let mut seen = self.seen.lock();
        self.sweep_expired(&mut seen);
        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(
            key,
            Seen {
                hop,
                first_seen: Instant::now(),
            },
        );
        true
    }

    /// Whether a message at this hop count should still be relayed.
    pub fn should_relay(hop: u8) -> bool {
        hop < MAX_ROUNDS
    }

    pub fn contains(&self, key: &Hash256) -> bool {
        self.seen.lock().contains_key(key)
    }

    /// Snapshot of currently tracked keys, for the periodic pull
    /// reconciliation loop to advertise to a random peer sample.
    pub fn recent_keys(&self) -> Vec<Hash256> {
        self.seen.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep_expired(&self, seen: &mut HashMap<Hash256, Seen>) {
        let now = Instant::now();
        seen.retain(|_, v| now.duration_since(v.first_seen) < ENTRY_TTL);
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> Hash256 {
        let mut h = [0u8; 32];
        h[0] = n;
        h
    }

    #[test]
    fn first_observation_is_accepted_repeats_are_dropped() {
        let cache = DedupCache::new();
        assert!(cache.observe(key(1), 0));
        assert!(!cache.observe(key(1), 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_keys_are_tracked_independently() {
        let cache = DedupCache::new();
        assert!(cache.observe(key(1), 0));
        assert!(cache.observe(key(2), 0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn relay_is_gated_on_max_rounds() {
        assert!(DedupCache::should_relay(0));
        assert!(DedupCache::should_relay(MAX_ROUNDS - 1));
        assert!(!DedupCache::should_relay(MAX_ROUNDS));
        assert!(!DedupCache::should_relay(MAX_ROUNDS + 5));
    }
}

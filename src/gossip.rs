//! Gossip fan-out (§4.8): relay gossip-eligible messages to a random
//! sample of peers that have not yet seen them, aging each message out
//! after `MAX_ROUNDS` hops. Layered on top of [`crate::transport::dedup`],
//! which owns the seen-message bookkeeping.

use crate::transport::dedup::{DedupCache, FAN_OUT};
use crate::types::Hash256;
use rand::seq::SliceRandom;
use std::sync::Arc;

pub struct Gossip {
    cache: Arc<DedupCache>,
}

/// What to do with a gossip-eligible message after processing it.
pub enum RelayDecision {
    /// Already seen (or past its hop budget); drop it.
    Drop,
    /// First time seen; forward to these peers at `next_hop`.
    Forward {
        peers: Vec<String>,
        next_hop: u8,
    },
}

impl Gossip {
    pub fn new(cache: Arc<DedupCache>) -> Self {
        Self { cache }
    }

    /// A node originating a message itself: hop starts at 0.
    pub fn originate(&self, key: Hash256, peers: &[String]) -> RelayDecision {
        self.process(key, 0, peers)
    }

    /// A node relaying a message received at `hop` from some peer.
    pub fn process(&self, key: Hash256, hop: u8, peers: &[String]) -> RelayDecision {
        if !self.cache.observe(key, hop) {
            return RelayDecision::Drop;
        }
        if !DedupCache::should_relay(hop) {
            return RelayDecision::Drop;
        }
        let chosen = choose_fanout(peers);
        RelayDecision::Forward {
            peers: chosen,
            next_hop: hop + 1,
        }
    }

    /// Identifiers this node has recently seen, to offer a pull-sample
    /// peer for gossip-hole healing.
    pub fn recent_ids(&self) -> Vec<Hash256> {
        self.cache.recent_keys()
    }
}

fn choose_fanout(peers: &[String]) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut pool: Vec<&String> = peers.iter().collect();
    pool.shuffle(&mut rng);
    pool.into_iter().take(FAN_OUT).cloned().collect()
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
    fn originate_forwards_to_at_most_fanout_peers() {
        let gossip = Gossip::new(Arc::new(DedupCache::new()));
        let peers: Vec<String> = (0..10).map(|i| format!("peer-{i}")).collect();
        match gossip.originate(key(1), &peers) {
            RelayDecision::Forward { peers, next_hop } => {
                assert!(peers.len() <= FAN_OUT);
                assert_eq!(next_hop, 1);
            }
            RelayDecision::Drop => panic!("first observation must forward"),
        }
    }

    #[test]
    fn duplicate_message_is_dropped() {
        let gossip = Gossip::new(Arc::new(DedupCache::new()));
        let peers: Vec<String> = (0..5).map(|i| format!("peer-{i}")).collect();
        gossip.originate(key(2), &peers);
        match gossip.process(key(2), 1, &peers) {
            RelayDecision::Drop => {}
            RelayDecision::Forward { .. } => panic!("duplicate must be dropped"),
        }
    }

    #[test]
    fn message_past_max_rounds_is_not_relayed() {
        let gossip = Gossip::new(Arc::new(DedupCache::new()));
        let peers: Vec<String> = (0..5).map(|i| format!("peer-{i}")).collect();
        match gossip.process(key(3), 10, &peers) {
            RelayDecision::Drop => {}
            RelayDecision::Forward { .. } => panic!("hop 10 must not relay"),
        }
    }
}

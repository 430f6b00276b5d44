//! Peer discovery and connection-lifecycle bookkeeping (§4.7).
//!
//! Maintains a *known* peer map (candidates seen, possibly not
//! connected) and a *connected* peer set. A background loop tries to
//! keep `min_peers <= connected <= max_peers`, retrying failed peers
//! with a capped, spaced backoff.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownPeer {
    pub address: String,
    pub status: PeerStatus,
    pub last_seen_ms: u64,
    pub connection_attempts: u32,
    pub last_attempt_ms: u64,
}

impl KnownPeer {
    fn new(address: String) -> Self {
        Self {
            address,
            status: PeerStatus::Disconnected,
            last_seen_ms: now_ms(),
            connection_attempts: 0,
            last_attempt_ms: 0,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Where a discovered candidate address came from, in the priority
/// order the discovery loop walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    Seed,
    Gossip,
    Dns,
    LocalBroadcast,
}

pub struct PeerManagerConfig {
    pub self_address: String,
    pub min_peers: usize,
    pub max_peers: usize,
    pub max_retry_attempts: u32,
    pub retry_interval_ms: u64,
    pub peer_expiration_ms: u64,
}

pub struct PeerManager {
    known: RwLock<HashMap<String, KnownPeer>>,
    connected: RwLock<std::collections::HashSet<String>>,
    config: PeerManagerConfig,
}

impl PeerManager {
    pub fn new(config: PeerManagerConfig) -> Self {
        Self {
            known: RwLock::new(HashMap::new()),
            connected: RwLock::new(std::collections::HashSet::new()),
            config,
        }
    }

    /// Seed the known-peer map from a configured bootnode list. Always
    /// runs first, ahead of gossip/DNS/broadcast discovery.
    pub async fn seed(&self, bootnodes: &[String]) {
        for addr in bootnodes {
            self.consider_candidate(addr, DiscoverySource::Seed).await;
        }
    }

    /// Offer a freshly discovered address. Rejects self, already-known,
    /// and malformed candidates; otherwise records it as `Disconnected`
    /// and eligible for the maintenance loop to dial.
    pub async fn consider_candidate(&self, address: &str, _source: DiscoverySource) -> bool {
        if address == self.config.self_address {
            return false;
        }
        if !is_well_formed_address(address) {
            return false;
        }
        let mut known = self.known.write().await;
        if known.contains_key(address) {
            return false;
        }
        known.insert(address.to_string(), KnownPeer::new(address.to_string()));
        true
    }

    pub async fn mark_connected(&self, address: &str) {
        self.connected.write().await.insert(address.to_string());
        if let Some(peer) = self.known.write().await.get_mut(address) {
            peer.status = PeerStatus::Connected;
            peer.last_seen_ms = now_ms();
        }
    }

    pub async fn mark_disconnected(&self, address: &str) {
        self.connected.write().await.remove(address);
        if let Some(peer) = self.known.write().await.get_mut(address) {
            peer.status = PeerStatus::Disconnected;
        }
    }

    pub async fn mark_failed(&self, address: &str) {
        self.connected.write().await.remove(address);
        if let Some(peer) = self.known.write().await.get_mut(address) {
            peer.status = PeerStatus::Failed;
            peer.connection_attempts += 1;
            peer.last_attempt_ms = now_ms();
        }
    }

    pub async fn connected_count(&self) -> usize {
        self.connected.read().await.len()
    }

    /// Candidates worth dialing right now: known, not connected, under
    /// the retry cap, and past their backoff interval.
    pub async fn dial_candidates(&self) -> Vec<String> {
        let connected = self.connected.read().await;
        let known = self.known.read().await;
        let now = now_ms();
        known
            .values()
            .filter(|p| !connected.contains(&p.address))
            .filter(|p| p.connection_attempts < self.config.max_retry_attempts)
            .filter(|p| now.saturating_sub(p.last_attempt_ms) >= self.config.retry_interval_ms)
            .map(|p| p.address.clone())
            .collect()
    }

    /// Drop known peers that have been idle past `peer_expiration_ms`
    /// so they can be re-probed from scratch.
    pub async fn expire_stale(&self) {
        let now = now_ms();
        let expiration = self.config.peer_expiration_ms;
        let connected = self.connected.read().await.clone();
        self.known.write().await.retain(|addr, peer| {
            connected.contains(addr) || now.saturating_sub(peer.last_seen_ms) < expiration
        });
    }

    /// Whether the maintenance loop should be trying to dial more peers.
    pub async fn needs_more_peers(&self) -> bool {
        self.connected_count().await < self.config.min_peers
    }

    pub async fn at_capacity(&self) -> bool {
        self.connected_count().await >= self.config.max_peers
    }

    /// Background task: periodically expire stale entries and report
    /// how many dial attempts are needed to reach `min_peers`. Actual
    /// dialing is driven by the caller (it owns the transport layer);
    /// this loop only maintains peer bookkeeping.
    pub async fn run_maintenance_loop(self: Arc<Self>, period: Duration) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            self.expire_stale().await;
            let connected = self.connected_count().await;
            if connected < self.config.min_peers {
                tracing::warn!(
                    connected,
                    min_peers = self.config.min_peers,
                    "below minimum peer count"
                );
            }
        }
    }
}

fn is_well_formed_address(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PeerManager {
        PeerManager::new(PeerManagerConfig {
            self_address: "127.0.0.1:9000".to_string(),
            min_peers: 2,
            max_peers: 8,
            max_retry_attempts: 3,
            retry_interval_ms: 0,
            peer_expiration_ms: 60_000,
        })
    }

    #[tokio::test]
    async fn rejects_self_and_malformed_addresses() {
        let mgr = manager();
        assert!(!mgr.consider_candidate("127.0.0.1:9000", DiscoverySource::Seed).await);
        assert!(!mgr.consider_candidate("not-an-address", DiscoverySource::Seed).await);
        assert!(mgr.consider_candidate("10.0.0.1:9001", DiscoverySource::Seed).await);
    }

    #[tokio::test]
    async fn does_not_double_register_known_peers() {
        let mgr = manager();
        assert!(mgr.consider_candidate("10.0.0.1:9001", DiscoverySource::Gossip).await);
        assert!(!mgr.consider_candidate("10.0.0.1:9001", DiscoverySource::Dns).await);
    }

    #[tokio::test]
    async fn dial_candidates_exclude_connected_and_exhausted_peers() {
        let mgr = manager();
        mgr.consider_candidate("10.0.0.1:9001", DiscoverySource::Seed).await;
        mgr.consider_candidate("10.0.0.2:9001", DiscoverySource::Seed).await;
        mgr.mark_connected("10.0.0.1:9001").await;

        let candidates = mgr.dial_candidates().await;
        assert_eq!(candidates, vec!["10.0.0.2:9001".to_string()]);
    }

    #[tokio::test]
    async fn needs_more_peers_until_min_reached() {
        let mgr = manager();
        assert!(mgr.needs_more_peers().await);
        mgr.mark_connected("10.0.0.1:9001").await;
        assert!(mgr.needs_more_peers().await);
        mgr.mark_connected("10.0.0.2:9001").await;
        assert!(!mgr.needs_more_peers().await);
    }
}

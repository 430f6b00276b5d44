//! The super-node set (§3): an epoch-level external input. The election
//! process that produces this set lives outside the core — the core only
//! consumes a snapshot of stake weights and performance factors.

use crate::error::ConfigError;
use crate::types::PublicKeyBytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Performance factor is one of four discrete tiers.
pub const PERFORMANCE_FACTORS: [f64; 4] = [0.70, 0.85, 0.95, 1.00];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SuperNodeInfo {
    pub stake_weight: u64,
    pub performance_factor: f64,
    pub decay_factor: f64,
}

#[derive(Clone, Debug, Default)]
pub struct SuperNodeSet {
    nodes: HashMap<PublicKeyBytes, SuperNodeInfo>,
}

impl SuperNodeSet {
    pub fn new(nodes: HashMap<PublicKeyBytes, SuperNodeInfo>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, pk: &PublicKeyBytes) -> bool {
        self.nodes.contains_key(pk)
    }

    pub fn get(&self, pk: &PublicKeyBytes) -> Option<&SuperNodeInfo> {
        self.nodes.get(pk)
    }

    pub fn quorum_floor(&self) -> usize {
        crate::types::quorum_floor(self.nodes.len())
    }

    pub fn members(&self) -> impl Iterator<Item = (&PublicKeyBytes, &SuperNodeInfo)> {
        self.nodes.iter()
    }

    /// Load the epoch's super-node set from a JSON snapshot on disk. The
    /// election process that produces this file lives outside the core
    /// (§1 Non-goals: dynamic super-node re-election); the core only
    /// consumes it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let entries: Vec<SuperNodeEntry> =
            serde_json::from_str(&contents).map_err(|e| ConfigError::InvalidValue {
                field: "super_node_set_path",
                reason: e.to_string(),
            })?;

        let mut nodes = HashMap::with_capacity(entries.len());
        for entry in entries {
            let pk = hex::decode(&entry.public_key_hex).map_err(|e| ConfigError::InvalidValue {
                field: "super_node_set_path",
                reason: format!("invalid public_key_hex: {e}"),
            })?;
            if pk.len() != 32 {
                return Err(ConfigError::InvalidValue {
                    field: "super_node_set_path",
                    reason: "public_key_hex must decode to 32 bytes".to_string(),
                });
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&pk);
            nodes.insert(
                key,
                SuperNodeInfo {
                    stake_weight: entry.stake_weight,
                    performance_factor: entry.performance_factor,
                    decay_factor: entry.decay_factor,
                },
            );
        }
        Ok(Self::new(nodes))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SuperNodeEntry {
    public_key_hex: String,
    stake_weight: u64,
    performance_factor: f64,
    decay_factor: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_floor_tracks_set_size() {
        let mut map = HashMap::new();
        for i in 0..50u8 {
            map.insert(
                [i; 32],
                SuperNodeInfo {
                    stake_weight: 1,
                    performance_factor: 1.0,
                    decay_factor: 1.0,
                },
            );
        }
        let set = SuperNodeSet::new(map);
        assert_eq!(set.len(), 50);
        assert_eq!(set.quorum_floor(), 34);
    }

    #[test]
    fn loads_set_from_json_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("super_nodes.json");
        let entries = vec![SuperNodeEntry {
            public_key_hex: hex::encode([1u8; 32]),
            stake_weight: 500,
            performance_factor: 0.95,
            decay_factor: 1.0,
        }];
        std::fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();

        let set = SuperNodeSet::load_from_file(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(&[1u8; 32]));
    }

    #[test]
    fn rejects_malformed_public_key_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("super_nodes.json");
        std::fs::write(&path, r#"[{"public_key_hex":"zz","stake_weight":1,"performance_factor":1.0,"decay_factor":1.0}]"#).unwrap();
        assert!(SuperNodeSet::load_from_file(&path).is_err());
    }
}

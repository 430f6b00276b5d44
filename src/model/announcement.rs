//! VRF announcements (§3, §4.9): a super node's signed declaration of its
//! VRF output and score for a round.

use crate::consensus::scoring;
use crate::crypto::{primitives, vrf};
use crate::model::super_node::SuperNodeInfo;
use crate::types::PublicKeyBytes;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VRFAnnouncement {
    pub round: u32,
    pub public_key: PublicKeyBytes,
    pub vrf_output: [u8; 32],
    pub vrf_proof: [u8; 64],
    pub score: f64,
    pub timestamp_ms: u64,
}

impl VRFAnnouncement {
    /// §3: valid iff the VRF proof verifies against `public_key` and the
    /// round's `vrf_input`, and `score` reproduces deterministically.
    pub fn is_valid(&self, vrf_input: &[u8], node_info: &SuperNodeInfo) -> bool {
        let pk = match primitives::decode_public_key(&self.public_key) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        if vrf::vrf_verify(&pk, vrf_input, &self.vrf_output, &self.vrf_proof).is_err() {
            return false;
        }
        let recomputed = scoring::derive_score(&self.vrf_output, node_info);
        (recomputed - self.score).abs() <= scoring::EPSILON
    }
}

/// Deterministic ordering used whenever the announcement set must be
/// reduced: score descending, ties broken by public key ascending (§5).
pub fn sort_announcements(announcements: &mut [VRFAnnouncement]) {
    announcements.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.public_key.cmp(&b.public_key))
    });
}

//! The Block entity (§3, §4.2): immutable after construction.

use super::announcement::{sort_announcements, VRFAnnouncement};
use super::merkle::merkle_root;
use super::transaction::Transaction;
use crate::crypto::primitives::hash;
use crate::error::FormatError;
use crate::types::{Hash256, PublicKeyBytes, Signature64};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Length of the rewarded set (§3, GLOSSARY: "top-15 / rewarded set").
pub const REWARDED_TOP_N: usize = 15;

pub type BlockSignature = Signature64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub round: u32,
    pub timestamp_ms: u64,
    pub previous_hash: Hash256,
    pub proposer: PublicKeyBytes,
    pub vrf_output: [u8; 32],
    pub vrf_proof: [u8; 64],
    pub all_vrf_announcements: Vec<VRFAnnouncement>,
    pub rewarded_nodes: Vec<PublicKeyBytes>,
    pub merkle_root: Hash256,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    /// Big-endian unsigned difficulty target; `H(block)` as a big-endian
    /// unsigned integer must be strictly less than this value.
    pub difficulty_target: Vec<u8>,
    pub signatures: BTreeMap<PublicKeyBytes, BlockSignature>,
}

impl Block {
    /// Construct a block, recomputing `merkle_root` and `rewarded_nodes`
    /// from `transactions`/`all_vrf_announcements` and rejecting a caller
    /// that supplied a mismatched value for either (§3 invariant 1, 5).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        height: u64,
        round: u32,
        timestamp_ms: u64,
        previous_hash: Hash256,
        proposer: PublicKeyBytes,
        vrf_output: [u8; 32],
        vrf_proof: [u8; 64],
        mut all_vrf_announcements: Vec<VRFAnnouncement>,
        transactions: Vec<Transaction>,
        nonce: u64,
        difficulty_target: Vec<u8>,
    ) -> Result<Self, FormatError> {
        if difficulty_target.is_empty() {
            return Err(FormatError::ZeroValue {
                field: "difficulty_target",
            });
        }
        sort_announcements(&mut all_vrf_announcements);
        let rewarded_nodes = top_rewarded(&all_vrf_announcements);
        let merkle = merkle_root(&transactions);

        Ok(Self {
            height,
            round,
            timestamp_ms,
            previous_hash,
            proposer,
            vrf_output,
            vrf_proof,
            all_vrf_announcements,
            rewarded_nodes,
            merkle_root: merkle,
            transactions,
            nonce,
            difficulty_target,
            signatures: BTreeMap::new(),
        })
    }

    /// `H_sign(block)` (§4.2): the digest signatures are computed over.
    pub fn signing_digest(&self) -> Hash256 {
        hash(&[
            &self.height.to_be_bytes(),
            &self.round.to_be_bytes(),
            &self.timestamp_ms.to_be_bytes(),
            &self.previous_hash,
            &self.proposer,
            &self.vrf_output,
            &self.merkle_root,
            &self.nonce.to_be_bytes(),
            &self.difficulty_target,
        ])
    }

    /// `H(block) = SHA-256(H_sign(block) || be8(nonce))` (§4.5).
    pub fn pow_hash(&self) -> Hash256 {
        hash(&[&self.signing_digest(), &self.nonce.to_be_bytes()])
    }

    /// §3 invariant 6: `H(block)` as a big-endian unsigned integer must be
    /// strictly less than `difficulty_target`.
    pub fn meets_difficulty(&self) -> bool {
        big_endian_less_than(&self.pow_hash(), &self.difficulty_target)
    }

    pub fn quorum_reached(&self, floor: usize) -> bool {
        self.signatures.len() >= floor
    }
}

/// Compare two big-endian unsigned byte strings of possibly different
/// length: `a < b`.
fn big_endian_less_than(a: &[u8], b: &[u8]) -> bool {
    let pad = |v: &[u8], len: usize| -> Vec<u8> {
        let mut out = vec![0u8; len.saturating_sub(v.len())];
        out.extend_from_slice(v);
        out
    };
    let len = a.len().max(b.len());
    let (a, b) = (pad(a, len), pad(b, len));
    a < b
}

/// §3 invariant 5: the top-15 (by score desc, tie-break lex asc) public
/// keys, truncated to the set size if smaller. `announcements` is assumed
/// already sorted by [`sort_announcements`].
fn top_rewarded(sorted_announcements: &[VRFAnnouncement]) -> Vec<PublicKeyBytes> {
    sorted_announcements
        .iter()
        .take(REWARDED_TOP_N)
        .map(|a| a.public_key)
        .collect()
}

//! The wire message envelope and payload types (§4.6).
//!
//! Every frame carries the common envelope — sender, timestamp, a random
//! nonce (dedup key material), the payload, and a signature over the
//! envelope's canonical encoding — regardless of payload kind.

use crate::consensus::engine::{RoundInbound, RoundOutbound};
use crate::crypto::primitives;
use crate::model::announcement::VRFAnnouncement;
use crate::model::block::Block;
use crate::model::transaction::Transaction;
use crate::types::{Hash256, PublicKeyBytes, Signature64};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Payload {
    BlockProposal(Block),
    BlockVote {
        block_hash: Hash256,
        signature: Signature64,
    },
    Transaction(Transaction),
    VrfAnnouncement(VRFAnnouncement),
    PeerDiscovery {
        known_peers: Vec<String>,
    },
    SyncRequest {
        from_height: u64,
        to_height: u64,
    },
    SyncResponse {
        blocks: Vec<Block>,
    },
    Ping {
        nonce: u64,
    },
    Pong {
        nonce: u64,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: PublicKeyBytes,
    pub timestamp_ms: u64,
    /// Random per-message nonce; doubles as the gossip dedup key together
    /// with `sender` (§4.8).
    pub nonce: u64,
    pub payload: Payload,
    pub signature: Signature64,
}

impl Envelope {
    pub fn signing_bytes(
        sender: &PublicKeyBytes,
        timestamp_ms: u64,
        nonce: u64,
        payload: &Payload,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(sender);
        buf.extend_from_slice(&timestamp_ms.to_be_bytes());
        buf.extend_from_slice(&nonce.to_be_bytes());
        buf.extend_from_slice(&bincode::serialize(payload).unwrap_or_default());
        buf
    }

    pub fn verify(&self) -> bool {
        let pk = match primitives::decode_public_key(&self.sender) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let bytes = Self::signing_bytes(&self.sender, self.timestamp_ms, self.nonce, &self.payload);
        primitives::verify(&pk, &bytes, &self.signature)
    }

    /// A stable dedup key: sender + nonce (§4.8 gossip cache key).
    pub fn dedup_key(&self) -> Hash256 {
        primitives::hash(&[&self.sender, &self.nonce.to_be_bytes()])
    }
}

/// Translate an inbound envelope into the round driver's inbound message
/// type, when the payload is consensus-relevant.
pub fn to_round_inbound(envelope: &Envelope) -> Option<RoundInbound> {
    match &envelope.payload {
        Payload::VrfAnnouncement(ann) => Some(RoundInbound::Announcement(ann.clone())),
        Payload::BlockProposal(block) => Some(RoundInbound::Block(block.clone())),
        Payload::BlockVote {
            block_hash,
            signature,
        } => Some(RoundInbound::Vote {
            block_hash: *block_hash,
            signer: envelope.sender,
            signature: *signature,
        }),
        _ => None,
    }
}

/// Wrap a round driver's outbound message into a payload ready for
/// signing and framing.
pub fn from_round_outbound(out: RoundOutbound) -> Payload {
    match out {
        RoundOutbound::Announcement(ann) => Payload::VrfAnnouncement(ann),
        RoundOutbound::Block(block) => Payload::BlockProposal(block),
        RoundOutbound::Vote {
            block_hash,
            signer: _,
            signature,
        } => Payload::BlockVote {
            block_hash,
            signature,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::primitives::{keypair_generate, sign};

    #[test]
    fn envelope_verify_accepts_genuine_signature() {
        let (sk, pk) = keypair_generate();
        let payload = Payload::Ping { nonce: 7 };
        let bytes = Envelope::signing_bytes(&pk.to_bytes(), 1, 2, &payload);
        let signature = sign(&sk, &bytes);
        let envelope = Envelope {
            sender: pk.to_bytes(),
            timestamp_ms: 1,
            nonce: 2,
            payload,
            signature,
        };
        assert!(envelope.verify());
    }

    #[test]
    fn envelope_verify_rejects_tampered_payload() {
        let (sk, pk) = keypair_generate();
        let payload = Payload::Ping { nonce: 7 };
        let bytes = Envelope::signing_bytes(&pk.to_bytes(), 1, 2, &payload);
        let signature = sign(&sk, &bytes);
        let mut envelope = Envelope {
            sender: pk.to_bytes(),
            timestamp_ms: 1,
            nonce: 2,
            payload,
            signature,
        };
        envelope.payload = Payload::Ping { nonce: 8 };
        assert!(!envelope.verify());
    }

    #[test]
    fn dedup_key_is_stable_for_same_sender_and_nonce() {
        let (_, pk) = keypair_generate();
        let e1 = Envelope {
            sender: pk.to_bytes(),
            timestamp_ms: 1,
            nonce: 99,
            payload: Payload::Ping { nonce: 1 },
            signature: [0; 64],
        };
        let e2 = Envelope {
            timestamp_ms: 2,
            ..e1.clone()
        };
        assert_eq!(e1.dedup_key(), e2.dedup_key());
    }
}

//! The round driver (§4.9, §5): one task per round, joining VRF compute,
//! broadcast, the collection-window timer, and PoW search at phase
//! boundaries. Rounds are strictly sequential — round `r+1` never starts
//! before round `r` reaches FINAL or FAILED.

use crate::consensus::pow;
use crate::consensus::round::RoundState;
use crate::consensus::scoring::{self, EPSILON};
use crate::crypto::primitives;
use crate::error::ValidationError;
use crate::identity::NodeIdentity;
use crate::model::account::AccountState;
use crate::model::announcement::{sort_announcements, VRFAnnouncement};
use crate::model::block::{Block, REWARDED_TOP_N};
use crate::model::super_node::SuperNodeSet;
use crate::model::transaction::Transaction;
use crate::types::{Hash256, PublicKeyBytes};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::debug;

pub const VRF_COLLECTION_WINDOW: Duration = Duration::from_secs(3);
pub const BLOCK_WAIT_WINDOW: Duration = Duration::from_secs(5);
pub const POW_BUDGET: Duration = Duration::from_secs(3);

/// Everything the round driver needs from the rest of the node, expressed
/// as capability traits so the engine stays independent of the concrete
/// mempool/storage/transport implementations (§1: external collaborators).
pub trait MempoolSource: Send + Sync {
    fn select_for_block(&self, max: usize) -> Vec<Transaction>;
}

pub trait AccountView: Send + Sync {
    fn get(&self, pk: &PublicKeyBytes) -> AccountState;
}

#[derive(Debug)]
pub enum RoundOutcome {
    Finalized(Block),
    Skipped { reason: &'static str },
    Failed { reason: &'static str },
}

/// Messages the round driver consumes from gossip/transport during a round.
pub enum RoundInbound {
    Announcement(VRFAnnouncement),
    Block(Block),
    Vote {
        block_hash: Hash256,
        signer: PublicKeyBytes,
        signature: [u8; 64],
    },
}

/// Messages the round driver emits for gossip/transport to broadcast.
pub enum RoundOutbound {
    Announcement(VRFAnnouncement),
    Block(Block),
    Vote {
        block_hash: Hash256,
        signer: PublicKeyBytes,
        signature: [u8; 64],
    },
}

pub struct ConsensusEngine {
    identity: Arc<NodeIdentity>,
    super_nodes: SuperNodeSet,
    mempool: Arc<dyn MempoolSource>,
    accounts: Arc<dyn AccountView>,
    max_tx_per_block: usize,
}

impl ConsensusEngine {
    pub fn new(
        identity: Arc<NodeIdentity>,
        super_nodes: SuperNodeSet,
        mempool: Arc<dyn MempoolSource>,
        accounts: Arc<dyn AccountView>,
        max_tx_per_block: usize,
    ) -> Self {
        Self {
            identity,
            super_nodes,
            mempool,
            accounts,
            max_tx_per_block,
        }
    }

    /// `vrf_input(round, prev_hash) = SHA-256(prev_hash || be4(round))`.
    pub fn vrf_input(round: u32, prev_hash: &Hash256) -> Hash256 {
        primitives::hash(&[prev_hash, &round.to_be_bytes()])
    }

    /// Drive a single round to completion. `inbound` feeds announcements,
    /// candidate blocks, and votes observed from the network; `outbound`
    /// carries this node's own broadcasts out to gossip.
    pub async fn run_round(
        &self,
        height: u64,
        round: u32,
        prev_hash: Hash256,
        difficulty_target: Vec<u8>,
        mut inbound: mpsc::UnboundedReceiver<RoundInbound>,
        outbound: mpsc::UnboundedSender<RoundOutbound>,
    ) -> RoundOutcome {
        debug!(round, state = ?RoundState::CollectVrf, "round phase");
        let input = Self::vrf_input(round, &prev_hash);

        // --- COLLECT_VRF: compute + broadcast our own announcement, then
        // collect everyone else's until the 3s deadline or the full set.
        let (own_output, own_proof) = self.identity.vrf_evaluate(&input);
        let own_pk = self.identity.public_key_bytes();
        let own_info = match self.super_nodes.get(&own_pk) {
            Some(info) => *info,
            None => return RoundOutcome::Skipped { reason: "local node is not a super node" },
        };
        let own_score = scoring::derive_score(&own_output, &own_info);
        let own_announcement = VRFAnnouncement {
            round,
            public_key: own_pk,
            vrf_output: own_output,
            vrf_proof: own_proof,
            score: own_score,
            timestamp_ms: now_ms(),
        };
        let _ = outbound.send(RoundOutbound::Announcement(own_announcement.clone()));

        let mut announcements: HashMap<PublicKeyBytes, VRFAnnouncement> = HashMap::new();
        announcements.insert(own_pk, own_announcement);

        let deadline = Instant::now() + VRF_COLLECTION_WINDOW;
        while announcements.len() < self.super_nodes.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, inbound.recv()).await {
                Ok(Some(RoundInbound::Announcement(ann))) => {
                    if ann.round != round {
                        continue;
                    }
                    let node_info = match self.super_nodes.get(&ann.public_key) {
                        Some(i) => *i,
                        None => continue,
                    };
                    if !ann.is_valid(&input, &node_info) {
                        continue;
                    }
                    // §4.10.2/.3: keep the first; duplicates and conflicts are ignored.
                    announcements.entry(ann.public_key).or_insert(ann);
                }
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => break,
            }
        }

        // --- DECIDE
        debug!(round, state = ?RoundState::Decide, "round phase");
        let floor = self.super_nodes.quorum_floor();
        if announcements.len() < floor {
            return RoundOutcome::Skipped {
                reason: "insufficient VRF announcements",
            };
        }

        let mut sorted: Vec<VRFAnnouncement> = announcements.into_values().collect();
        sort_announcements(&mut sorted);
        let proposer = sorted[0].public_key;
        let backup = sorted.get(1).map(|a| a.public_key);

        if proposer == own_pk {
            debug!(round, state = ?RoundState::Proposing, "round phase");
            if let Some(block) = self
                .propose(
                    height,
                    round,
                    prev_hash,
                    own_output,
                    own_proof,
                    sorted.clone(),
                    difficulty_target.clone(),
                )
                .await
            {
                let _ = outbound.send(RoundOutbound::Block(block.clone()));
                return self
                    .collect_signatures(block, &mut inbound, &outbound, floor)
                    .await;
            }
            // §4.10.6: PoW timeout at proposer — abandon, await the backup.
            debug!(round, state = ?RoundState::Awaiting { winner: proposer }, "round phase");
        } else {
            debug!(round, state = ?RoundState::Awaiting { winner: proposer }, "round phase");
        }

        // --- AWAITING: wait up to 5s for the declared winner's block.
        let block_deadline = Instant::now() + BLOCK_WAIT_WINDOW;
        loop {
            let remaining = block_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, inbound.recv()).await {
                Ok(Some(RoundInbound::Block(block))) => {
                    if self
                        .validate_block(&block, height, &prev_hash, floor, &difficulty_target)
                        .is_ok()
                    {
                        return self
                            .collect_signatures(block, &mut inbound, &outbound, floor)
                            .await;
                    }
                    // invalid: stay in AWAITING, refrain from signing (§4.9 validation).
                }
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => break,
            }
        }

        // Primary missed the window. If we are backup, try once ourselves.
        if backup == Some(own_pk) {
            debug!(round, state = ?RoundState::Backup, "round phase");
            if let Some(block) = self
                .propose(
                    height,
                    round,
                    prev_hash,
                    own_output,
                    own_proof,
                    sorted.clone(),
                    difficulty_target.clone(),
                )
                .await
            {
                let _ = outbound.send(RoundOutbound::Block(block.clone()));
                return self
                    .collect_signatures(block, &mut inbound, &outbound, floor)
                    .await;
            }
        }

        RoundOutcome::Failed {
            reason: "primary and backup both missed the block-wait window",
        }
    }

    /// Build and PoW-mine a block as the round's proposer (§4.9 PROPOSING).
    async fn propose(
        &self,
        height: u64,
        round: u32,
        prev_hash: Hash256,
        vrf_output: [u8; 32],
        vrf_proof: [u8; 64],
        announcements: Vec<VRFAnnouncement>,
        difficulty_target: Vec<u8>,
    ) -> Option<Block> {
        let transactions = self.mempool.select_for_block(self.max_tx_per_block);
        let admissible = self.filter_admissible(transactions);

        let mut block = Block::new(
            height,
            round,
            now_ms(),
            prev_hash,
            self.identity.public_key_bytes(),
            vrf_output,
            vrf_proof,
            announcements,
            admissible,
            0,
            difficulty_target,
        )
        .ok()?;

        let mined = tokio::task::block_in_place(|| pow::mine(&mut block, POW_BUDGET));
        if !mined {
            return None;
        }
        Some(block)
    }

    /// §3 invariant 7: drop transactions that fail stateless or
    /// state-dependent admissibility against the parent account state.
    fn filter_admissible(&self, txs: Vec<Transaction>) -> Vec<Transaction> {
        txs.into_iter()
            .filter(|tx| {
                tx.verify_signature()
                    && self
                        .accounts
                        .get(&tx.sender)
                        .can_spend(tx.amount, tx.fee, tx.nonce)
            })
            .collect()
    }

    /// The ten-step validation order (§4.9).
    pub fn validate_block(
        &self,
        block: &Block,
        height: u64,
        prev_hash: &Hash256,
        floor: usize,
        difficulty_target: &[u8],
    ) -> Result<(), ValidationError> {
        // (1) format is enforced by construction (Block::new).
        // (2) prev_hash/height must match the round's own tip, not just the
        // block's internal self-consistency.
        if block.previous_hash != *prev_hash || block.height != height {
            return Err(ValidationError::UnknownParent);
        }

        // (3) all VRFs verify + (4) every score reproduces within epsilon.
        for ann in &block.all_vrf_announcements {
            if ann.round != block.round {
                return Err(ValidationError::RoundMismatch(ann.round, block.round));
            }
            let node_info = self
                .super_nodes
                .get(&ann.public_key)
                .ok_or(ValidationError::InvalidAnnouncement)?;
            let input = Self::vrf_input(block.round, &block.previous_hash);
            let pk = primitives::decode_public_key(&ann.public_key)
                .map_err(|_| ValidationError::InvalidAnnouncement)?;
            if crate::crypto::vrf::vrf_verify(&pk, &input, &ann.vrf_output, &ann.vrf_proof).is_err()
            {
                return Err(ValidationError::InvalidAnnouncement);
            }
            let recomputed = scoring::derive_score(&ann.vrf_output, node_info);
            if (recomputed - ann.score).abs() > EPSILON {
                return Err(ValidationError::ScoreMismatch);
            }
        }

        // (5) quorum floor.
        if block.all_vrf_announcements.len() < floor {
            return Err(ValidationError::QuorumNotMet {
                have: block.all_vrf_announcements.len(),
                need: floor,
            });
        }

        // (6) proposer holds the max score (ties broken lex-asc, already
        // the sort order `sort_announcements` produces).
        let mut sorted = block.all_vrf_announcements.clone();
        sort_announcements(&mut sorted);
        if sorted[0].public_key != block.proposer {
            return Err(ValidationError::ProposerNotMax);
        }

        // (7) rewarded_nodes is the correct deterministic top-15.
        let expected_rewarded: Vec<PublicKeyBytes> = sorted
            .iter()
            .take(REWARDED_TOP_N)
            .map(|a| a.public_key)
            .collect();
        if block.rewarded_nodes != expected_rewarded {
            return Err(ValidationError::BadRewardedSet);
        }

        // (8) PoW holds.
        if block.difficulty_target != difficulty_target || !block.meets_difficulty() {
            return Err(ValidationError::PowNotMet);
        }

        // (9) every transaction passes stateless + state-dependent checks.
        for tx in &block.transactions {
            if !tx.verify_signature() {
                return Err(ValidationError::TransactionRejected(
                    "signature verification failed".into(),
                ));
            }
            let account = self.accounts.get(&tx.sender);
            if !account.can_spend(tx.amount, tx.fee, tx.nonce) {
                return Err(ValidationError::TransactionRejected(
                    "insufficient balance or stale nonce".into(),
                ));
            }
        }

        Ok(())
    }

    /// SIGNING: sign and broadcast a vote, then accumulate votes into the
    /// block until quorum, at which point it is final (§3 invariant 8).
    async fn collect_signatures(
        &self,
        mut block: Block,
        inbound: &mut mpsc::UnboundedReceiver<RoundInbound>,
        outbound: &mpsc::UnboundedSender<RoundOutbound>,
        floor: usize,
    ) -> RoundOutcome {
        debug!(round = block.round, state = ?RoundState::Signing, "round phase");
        let digest = block.signing_digest();
        let own_pk = self.identity.public_key_bytes();
        let own_sig = self.identity.sign(&digest);
        block.signatures.insert(own_pk, own_sig);
        let _ = outbound.send(RoundOutbound::Vote {
            block_hash: digest,
            signer: own_pk,
            signature: own_sig,
        });

        if block.quorum_reached(floor) {
            return RoundOutcome::Finalized(block);
        }

        while let Some(msg) = inbound.recv().await {
            if let RoundInbound::Vote {
                block_hash,
                signer,
                signature,
            } = msg
            {
                if block_hash == digest && self.super_nodes.contains(&signer) {
                    if let Ok(pk) = primitives::decode_public_key(&signer) {
                        if primitives::verify(&pk, &digest, &signature) {
                            block.signatures.insert(signer, signature);
                        }
                    }
                }
            }
            if block.quorum_reached(floor) {
                return RoundOutcome::Finalized(block);
            }
        }

        RoundOutcome::Failed {
            reason: "signature channel closed before quorum",
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

//! Benchmarks for the consensus hot path: block validation, PoW mining,
//! and the score derivation every announcement is checked against.
//!
//! Run with: cargo bench

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vrfchain::consensus::engine::{AccountView, ConsensusEngine, MempoolSource};
use vrfchain::consensus::pow;
use vrfchain::consensus::scoring::derive_score;
use vrfchain::crypto::primitives::{keypair_generate, sign};
use vrfchain::crypto::vrf::vrf_evaluate;
use vrfchain::identity::NodeIdentity;
use vrfchain::model::account::AccountState;
use vrfchain::model::announcement::{sort_announcements, VRFAnnouncement};
use vrfchain::model::block::Block;
use vrfchain::model::super_node::{SuperNodeInfo, SuperNodeSet};
use vrfchain::model::transaction::{Transaction, TransactionType};
use vrfchain::types::PublicKeyBytes;

struct EmptyMempool;
impl MempoolSource for EmptyMempool {
    fn select_for_block(&self, _max: usize) -> Vec<Transaction> {
        vec![]
    }
}

/// Every account reads as the zero-balance default, so only zero-amount,
/// zero-fee, zero-nonce transactions pass `can_spend` — good enough to
/// exercise the per-transaction validation loop without a real ledger.
struct ZeroAccounts;
impl AccountView for ZeroAccounts {
    fn get(&self, _pk: &PublicKeyBytes) -> AccountState {
        AccountState::default()
    }
}

fn easy_target() -> Vec<u8> {
    vec![0xFF; 32]
}

/// Build `n` valid, mutually-consistent VRF announcements (and the
/// matching `SuperNodeSet`) the way a real COLLECT_VRF phase would.
/// The input matches `ConsensusEngine::vrf_input(round=1, prev_hash=[0;
/// 32])`, the value `validate_block` recomputes internally, so the
/// generated proofs actually verify.
fn sample_announcements(n: usize) -> (Vec<VRFAnnouncement>, SuperNodeSet) {
    let input = ConsensusEngine::vrf_input(1, &[0u8; 32]);
    let info = SuperNodeInfo {
        stake_weight: 1_000,
        performance_factor: 0.95,
        decay_factor: 1.0,
    };
    let mut announcements = Vec::with_capacity(n);
    let mut members = HashMap::with_capacity(n);
    for _ in 0..n {
        let (sk, pk) = keypair_generate();
        let (output, proof) = vrf_evaluate(&sk, &input);
        let score = derive_score(&output, &info);
        announcements.push(VRFAnnouncement {
            round: 1,
            public_key: pk.to_bytes(),
            vrf_output: output,
            vrf_proof: proof,
            score,
            timestamp_ms: 1,
        });
        members.insert(pk.to_bytes(), info);
    }
    sort_announcements(&mut announcements);
    (announcements, SuperNodeSet::new(members))
}

fn zero_value_transaction() -> Transaction {
    let (sk, pk) = keypair_generate();
    let receiver = keypair_generate().1.to_bytes();
    let mut tx = Transaction::new(
        pk.to_bytes(),
        receiver,
        0,
        0,
        1_700_000_000_000,
        0,
        TransactionType::Transfer,
        [0u8; 64],
    )
    .unwrap();
    tx.signature = sign(&sk, &tx.signing_bytes());
    tx
}

fn mined_block(announcements: Vec<VRFAnnouncement>, proposer: PublicKeyBytes, txs: Vec<Transaction>) -> Block {
    let mut block = Block::new(
        1,
        1,
        1,
        [0; 32],
        proposer,
        [0; 32],
        [0; 64],
        announcements,
        txs,
        0,
        easy_target(),
    )
    .unwrap();
    pow::mine(&mut block, Duration::from_secs(3));
    block
}

fn engine_for(super_nodes: SuperNodeSet, identity_dir: &std::path::Path) -> ConsensusEngine {
    let identity = Arc::new(NodeIdentity::load_or_generate(&identity_dir.join("node.key")).unwrap());
    ConsensusEngine::new(identity, super_nodes, Arc::new(EmptyMempool), Arc::new(ZeroAccounts), 100)
}

fn bench_validate_block_no_txs(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let (announcements, super_nodes) = sample_announcements(33);
    let floor = super_nodes.quorum_floor();
    let proposer = announcements[0].public_key;
    let block = mined_block(announcements.clone(), proposer, vec![]);
    let engine = engine_for(super_nodes, dir.path());

    c.bench_function("validate_block_33_announcements_no_txs", |b| {
        b.iter(|| {
            let _ = engine.validate_block(black_box(&block), 1, &[0u8; 32], floor, &easy_target());
        })
    });
}

fn bench_validate_block_with_txs(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let (announcements, super_nodes) = sample_announcements(5);
    let floor = super_nodes.quorum_floor();
    let proposer = announcements[0].public_key;
    let txs: Vec<Transaction> = (0..100).map(|_| zero_value_transaction()).collect();
    let block = mined_block(announcements.clone(), proposer, txs);
    let engine = engine_for(super_nodes, dir.path());

    c.bench_function("validate_block_5_announcements_100_txs", |b| {
        b.iter(|| {
            let _ = engine.validate_block(black_box(&block), 1, &[0u8; 32], floor, &easy_target());
        })
    });
}

fn bench_pow_mine(c: &mut Criterion) {
    c.bench_function("pow_mine_easy_target", |b| {
        b.iter(|| {
            let mut block = Block::new(
                1,
                1,
                1,
                [0; 32],
                [1; 32],
                [0; 32],
                [0; 64],
                vec![],
                vec![],
                0,
                easy_target(),
            )
            .unwrap();
            black_box(pow::mine(&mut block, Duration::from_secs(3)));
        })
    });
}

fn bench_derive_score(c: &mut Criterion) {
    let node = SuperNodeInfo {
        stake_weight: 10_000,
        performance_factor: 0.95,
        decay_factor: 1.0,
    };
    let output = [0x42u8; 32];
    c.bench_function("derive_score", |b| {
        b.iter(|| black_box(derive_score(black_box(&output), black_box(&node))))
    });
}

criterion_group!(
    benches,
    bench_validate_block_no_txs,
    bench_validate_block_with_txs,
    bench_pow_mine,
    bench_derive_score
);
criterion_main!(benches);

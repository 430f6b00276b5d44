//! Full single-node data flow: a funded account signs a transfer, it is
//! admitted to the mempool, a consensus round picks it up, mines the
//! block, and the finalized result is applied to account state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use vrfchain::consensus::engine::{AccountView, ConsensusEngine, RoundOutcome};
use vrfchain::crypto::primitives::{keypair_generate, sign};
use vrfchain::identity::NodeIdentity;
use vrfchain::mempool::Mempool;
use vrfchain::model::account::AccountState;
use vrfchain::model::super_node::{SuperNodeInfo, SuperNodeSet};
use vrfchain::model::transaction::{Transaction, TransactionType};
use vrfchain::storage::block_store::BlockStorage;
use vrfchain::storage::kv::KvStore;
use vrfchain::storage::state_store::{AccountStateView, StateStorage};

#[tokio::test(flavor = "multi_thread")]
async fn a_mempool_transaction_reaches_finalized_account_state() {
    let dir = tempfile::tempdir().unwrap();
    let identity = Arc::new(NodeIdentity::load_or_generate(&dir.path().join("node.key")).unwrap());

    let mut members = HashMap::new();
    members.insert(
        identity.public_key_bytes(),
        SuperNodeInfo {
            stake_weight: 500,
            performance_factor: 1.0,
            decay_factor: 1.0,
        },
    );
    let super_nodes = SuperNodeSet::new(members);

    let kv = KvStore::open(&dir.path().join("db")).unwrap();
    let blocks = BlockStorage::new(kv.clone());
    let state = Arc::new(StateStorage::new(kv));

    let (sender_sk, sender_pk) = keypair_generate();
    let receiver_pk = keypair_generate().1;
    state
        .put(
            &sender_pk.to_bytes(),
            &AccountState {
                balance: 1_000,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mempool = Arc::new(Mempool::new(100, 1));
    let mut transfer = Transaction::new(
        sender_pk.to_bytes(),
        receiver_pk.to_bytes(),
        200,
        5,
        1_700_000_000_000,
        0,
        TransactionType::Transfer,
        [0u8; 64],
    )
    .unwrap();
    transfer.signature = sign(&sender_sk, &transfer.signing_bytes());

    let sender_state = state.get(&sender_pk.to_bytes()).await.unwrap();
    mempool.admit(transfer, &sender_state).unwrap();
    assert_eq!(mempool.len(), 1);

    let accounts: Arc<dyn AccountView> = Arc::new(AccountStateView::new(state.clone()));
    let engine = ConsensusEngine::new(identity, super_nodes, mempool.clone(), accounts, 100);

    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let (_in_tx, in_rx) = mpsc::unbounded_channel();

    let outcome = engine
        .run_round(1, 0, [0u8; 32], vec![0xFF; 32], in_rx, out_tx)
        .await;

    let block = match outcome {
        RoundOutcome::Finalized(block) => block,
        other => panic!("expected a finalized block, got {other:?}"),
    };
    assert_eq!(block.transactions.len(), 1);

    blocks.store_block(&block).await.unwrap();
    state.apply_block(&block).await.unwrap();

    let sender_after = state.get(&sender_pk.to_bytes()).await.unwrap();
    let receiver_after = state.get(&receiver_pk.to_bytes()).await.unwrap();
    assert_eq!(sender_after.balance, 1_000 - 200 - 5);
    assert_eq!(sender_after.nonce, 1);
    assert_eq!(receiver_after.balance, 200);
}

//! Account state storage (§3, §4.9 step 9): one row per public key,
//! updated only when a block finalizes (one-transaction-per-block-height
//! application order, not mutated speculatively during a round).

use crate::consensus::engine::AccountView;
use crate::error::StorageError;
use crate::model::account::AccountState;
use crate::model::block::Block;
use crate::model::transaction::TransactionType;
use crate::storage::kv::KvStore;
use crate::types::PublicKeyBytes;
use std::sync::Arc;

const ACCOUNT_NS: &str = "account";
const STATE_META_NS: &str = "state_meta";
const APPLIED_HEIGHT_KEY: &[u8] = b"applied_height";

pub struct StateStorage {
    kv: KvStore,
}

impl StateStorage {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    pub async fn get(&self, pk: &PublicKeyBytes) -> Result<AccountState, StorageError> {
        Ok(self
            .kv
            .get(ACCOUNT_NS, pk.to_vec())
            .await?
            .unwrap_or_default())
    }

    pub async fn put(&self, pk: &PublicKeyBytes, account: &AccountState) -> Result<(), StorageError> {
        self.kv.put(ACCOUNT_NS, pk.to_vec(), account).await
    }

    /// The height of the most recently applied block, if any.
    pub async fn applied_height(&self) -> Result<Option<u64>, StorageError> {
        self.kv
            .get(STATE_META_NS, APPLIED_HEIGHT_KEY.to_vec())
            .await
    }

    /// Apply every transaction in a finalized block to account state, in
    /// block order. Reward the block's top-N announcers with the
    /// accumulated fee pool split evenly (§3, §9: reward mechanics are an
    /// accounting detail left to the implementer).
    ///
    /// Idempotent (§8 universal invariant 6): a block at or below the
    /// already-applied height is a no-op, so retrying a finalized block's
    /// persistence or re-driving sync over already-applied heights never
    /// double-credits or double-debits an account.
    pub async fn apply_block(&self, block: &Block) -> Result<(), StorageError> {
        if let Some(applied) = self.applied_height().await? {
            if block.height <= applied {
                return Ok(());
            }
        }

        let at_ms = block.timestamp_ms;
        let mut fee_pool: u64 = 0;

        for tx in &block.transactions {
            let mut sender = self.get(&tx.sender).await?;
            sender.debit(tx.amount, tx.fee, at_ms);
            self.put(&tx.sender, &sender).await?;
            fee_pool = fee_pool.saturating_add(tx.fee);

            match tx.tx_type {
                TransactionType::Transfer => {
                    let mut receiver = self.get(&tx.receiver).await?;
                    receiver.credit(tx.amount, at_ms);
                    self.put(&tx.receiver, &receiver).await?;
                }
                TransactionType::Stake => {
                    let mut sender = self.get(&tx.sender).await?;
                    sender.stake_amount = sender.stake_amount.saturating_add(tx.amount);
                    self.put(&tx.sender, &sender).await?;
                }
                TransactionType::Unstake => {
                    let mut sender = self.get(&tx.sender).await?;
                    sender.stake_amount = sender.stake_amount.saturating_sub(tx.amount);
                    sender.credit(tx.amount, at_ms);
                    self.put(&tx.sender, &sender).await?;
                }
                TransactionType::Vote => {}
            }
        }

        if !block.rewarded_nodes.is_empty() && fee_pool > 0 {
            let share = fee_pool / block.rewarded_nodes.len() as u64;
            for pk in &block.rewarded_nodes {
                let mut account = self.get(pk).await?;
                account.credit(share, at_ms);
                self.put(pk, &account).await?;
            }
        }

        self.kv
            .put(STATE_META_NS, APPLIED_HEIGHT_KEY.to_vec(), &block.height)
            .await
    }
}

/// Bridges the async [`StateStorage`] to the consensus engine's synchronous
/// [`AccountView`], since the round driver's `filter_admissible`/
/// `validate_block` paths are plain synchronous calls. Mirrors the
/// `tokio::task::block_in_place` bridge the engine already uses for its
/// PoW search — both exist because the round driver keeps a synchronous
/// boundary at the consensus/storage seam.
pub struct AccountStateView {
    state: Arc<StateStorage>,
}

impl AccountStateView {
    pub fn new(state: Arc<StateStorage>) -> Self {
        Self { state }
    }
}

impl AccountView for AccountStateView {
    fn get(&self, pk: &PublicKeyBytes) -> AccountState {
        let state = self.state.clone();
        let pk = *pk;
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move { state.get(&pk).await })
        })
        .unwrap_or_default()
    }
}

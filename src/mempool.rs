//! The mempool (§4.4): a bounded, concurrently-accessed set of admitted
//! transactions awaiting inclusion, prioritized by fee.

use crate::consensus::engine::MempoolSource;
use crate::model::account::AccountState;
use crate::model::transaction::Transaction;
use crate::types::Hash256;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MempoolError {
    #[error("transaction is malformed or fails signature verification")]
    InvalidFormat,
    #[error("fee {fee} is below the admission threshold {threshold}")]
    FeeTooLow { fee: u64, threshold: u64 },
    #[error("sender cannot afford amount + fee, or nonce is stale")]
    NotAdmissible,
    #[error("transaction already present in the pool")]
    AlreadyExists,
}

#[derive(Clone)]
struct Entry {
    tx: Transaction,
    fee: u64,
    added_at: Instant,
}

/// Lock-free concurrent transaction pool (§5: shared across the gossip
/// receive path and the proposer's block-build path).
pub struct Mempool {
    entries: DashMap<Hash256, Entry>,
    count: AtomicUsize,
    capacity: usize,
    min_fee: u64,
}

impl Mempool {
    pub fn new(capacity: usize, min_fee: u64) -> Self {
        Self {
            entries: DashMap::new(),
            count: AtomicUsize::new(0),
            capacity,
            min_fee,
        }
    }

    /// Admit `tx` after format, fee-floor, and state-dependent checks
    /// against `sender_state`; evicts the current lowest-fee entry if the
    /// pool is at capacity and `tx`'s fee clears it.
    pub fn admit(&self, tx: Transaction, sender_state: &AccountState) -> Result<(), MempoolError> {
        if !tx.verify_signature() {
            return Err(MempoolError::InvalidFormat);
        }
        if tx.fee < self.min_fee {
            return Err(MempoolError::FeeTooLow {
                fee: tx.fee,
                threshold: self.min_fee,
            });
        }
        if !sender_state.can_spend(tx.amount, tx.fee, tx.nonce) {
            return Err(MempoolError::NotAdmissible);
        }

        let txid = tx.hash();
        if self.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyExists);
        }

        if self.count.load(Ordering::Relaxed) >= self.capacity {
            self.evict_lowest_fee();
        }

        let fee = tx.fee;
        self.entries.insert(
            txid,
            Entry {
                tx,
                fee,
                added_at: Instant::now(),
            },
        );
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn remove(&self, txid: &Hash256) -> bool {
        if self.entries.remove(txid).is_some() {
            self.count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select up to `max` transactions for a candidate block, highest fee
    /// first, ties broken by insertion order (oldest first).
    pub fn select_top_by_fee(&self, max: usize) -> Vec<Transaction> {
        let mut candidates: Vec<Entry> = self.entries.iter().map(|e| e.value().clone()).collect();
        candidates.sort_by(|a, b| b.fee.cmp(&a.fee).then_with(|| a.added_at.cmp(&b.added_at)));
        candidates.into_iter().take(max).map(|e| e.tx).collect()
    }

    fn evict_lowest_fee(&self) {
        let lowest = self
            .entries
            .iter()
            .min_by(|a, b| {
                a.value()
                    .fee
                    .cmp(&b.value().fee)
                    .then_with(|| b.value().added_at.cmp(&a.value().added_at))
            })
            .map(|e| *e.key());
        if let Some(txid) = lowest {
            self.remove(&txid);
        }
    }
}

impl MempoolSource for Mempool {
    fn select_for_block(&self, max: usize) -> Vec<Transaction> {
        self.select_top_by_fee(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::primitives::{keypair_generate, sign};
    use crate::model::transaction::TransactionType;

    fn tx(fee: u64, nonce: u64) -> (Transaction, AccountState) {
        let (sk, pk) = keypair_generate();
        let receiver = keypair_generate().1.to_bytes();
        let mut t = Transaction::new(
            pk.to_bytes(),
            receiver,
            10,
            fee,
            1_700_000_000_000,
            nonce,
            TransactionType::Transfer,
            [0u8; 64],
        )
        .unwrap();
        t.signature = sign(&sk, &t.signing_bytes());
        let state = AccountState {
            balance: 1_000,
            nonce,
            ..Default::default()
        };
        (t, state)
    }

    #[test]
    fn admits_and_selects_by_descending_fee() {
        let pool = Mempool::new(10, 1);
        let (tx_low, st_low) = tx(2, 0);
        let (tx_high, st_high) = tx(9, 0);
        pool.admit(tx_low, &st_low).unwrap();
        pool.admit(tx_high.clone(), &st_high).unwrap();

        let selected = pool.select_top_by_fee(10);
        assert_eq!(selected[0].fee, 9);
        assert_eq!(selected[0].sender, tx_high.sender);
    }

    #[test]
    fn rejects_fee_below_threshold() {
        let pool = Mempool::new(10, 5);
        let (t, st) = tx(1, 0);
        assert_eq!(
            pool.admit(t, &st).unwrap_err(),
            MempoolError::FeeTooLow {
                fee: 1,
                threshold: 5
            }
        );
    }

    #[test]
    fn rejects_duplicate_transaction() {
        let pool = Mempool::new(10, 1);
        let (t, st) = tx(3, 0);
        pool.admit(t.clone(), &st).unwrap();
        assert_eq!(pool.admit(t, &st).unwrap_err(), MempoolError::AlreadyExists);
    }

    #[test]
    fn evicts_lowest_fee_when_full() {
        let pool = Mempool::new(2, 1);
        let (t1, s1) = tx(1, 0);
        let (t2, s2) = tx(2, 0);
        let (t3, s3) = tx(3, 0);
        pool.admit(t1, &s1).unwrap();
        pool.admit(t2, &s2).unwrap();
        pool.admit(t3, &s3).unwrap();

        assert_eq!(pool.len(), 2);
        let fees: Vec<u64> = pool.select_top_by_fee(10).iter().map(|t| t.fee).collect();
        assert!(!fees.contains(&1), "lowest-fee entry should be evicted");
    }
}

//! Merkle root computation over transaction hashes (§4.2).
//!
//! Leaves are transaction hashes in block order. Internal nodes hash
//! `left || right`; an odd node count at any level duplicates the final
//! node. An empty list yields 32 zero bytes.

use super::transaction::Transaction;
use crate::crypto::primitives::hash;
use crate::types::Hash256;

pub fn merkle_root(transactions: &[Transaction]) -> Hash256 {
    let mut level: Vec<Hash256> = transactions.iter().map(|tx| tx.hash()).collect();

    if level.is_empty() {
        return [0u8; 32];
    }

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| hash(&[&pair[0], &pair[1]]))
            .collect();
    }
    level[0]
}

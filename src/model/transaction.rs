//! The transaction entity (§3, §4.2).

use crate::crypto::primitives;
use crate::error::FormatError;
use crate::types::{Hash256, PublicKeyBytes, Signature64};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Transfer,
    Stake,
    Unstake,
    Vote,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: PublicKeyBytes,
    pub receiver: PublicKeyBytes,
    pub amount: u64,
    pub fee: u64,
    pub timestamp_ms: u64,
    pub nonce: u64,
    pub tx_type: TransactionType,
    pub signature: Signature64,
}

impl Transaction {
    /// Construct a transaction, enforcing the format invariants in §4.2:
    /// nonzero timestamp and a well-formed (already-sized) signature. The
    /// signature itself is not verified here — that is a validation-layer
    /// concern (§4.9 step 9), since it depends on the signing digest.
    pub fn new(
        sender: PublicKeyBytes,
        receiver: PublicKeyBytes,
        amount: u64,
        fee: u64,
        timestamp_ms: u64,
        nonce: u64,
        tx_type: TransactionType,
        signature: Signature64,
    ) -> Result<Self, FormatError> {
        if timestamp_ms == 0 {
            return Err(FormatError::ZeroValue {
                field: "timestamp_ms",
            });
        }
        Ok(Self {
            sender,
            receiver,
            amount,
            fee,
            timestamp_ms,
            nonce,
            tx_type,
            signature,
        })
    }

    /// The bytes signed by the sender: the canonical encoding excluding
    /// the signature itself.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 32 + 8 + 8 + 8 + 8 + 1);
        buf.extend_from_slice(&self.sender);
        buf.extend_from_slice(&self.receiver);
        buf.extend_from_slice(&self.amount.to_be_bytes());
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.push(tx_type_tag(self.tx_type));
        buf
    }

    /// `H(tx) = SHA-256(sender || receiver || be8(amount) || be8(fee) ||
    /// be8(timestamp_ms) || be8(nonce))` — signature and type excluded.
    pub fn hash(&self) -> Hash256 {
        primitives::hash(&[
            &self.sender,
            &self.receiver,
            &self.amount.to_be_bytes(),
            &self.fee.to_be_bytes(),
            &self.timestamp_ms.to_be_bytes(),
            &self.nonce.to_be_bytes(),
        ])
    }

    /// Verify the signature over `signing_bytes` against the sender's
    /// public key.
    pub fn verify_signature(&self) -> bool {
        match primitives::decode_public_key(&self.sender) {
            Ok(pk) => primitives::verify(&pk, &self.signing_bytes(), &self.signature),
            Err(_) => false,
        }
    }
}

fn tx_type_tag(t: TransactionType) -> u8 {
    match t {
        TransactionType::Transfer => 0,
        TransactionType::Stake => 1,
        TransactionType::Unstake => 2,
        TransactionType::Vote => 3,
    }
}

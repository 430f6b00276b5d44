//! Account state (§3), mutated only by block application.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: u64,
    pub nonce: u64,
    pub stake_amount: u64,
    pub last_updated: u64,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this account can afford `amount + fee` at the current
    /// balance, and whether `tx_nonce` is the expected next nonce.
    pub fn can_spend(&self, amount: u64, fee: u64, tx_nonce: u64) -> bool {
        let total = match amount.checked_add(fee) {
            Some(t) => t,
            None => return false,
        };
        self.balance >= total && self.nonce == tx_nonce
    }

    /// Apply a debit (sender side) of a transfer/stake-class transaction.
    pub fn debit(&mut self, amount: u64, fee: u64, at_ms: u64) {
        self.balance = self.balance.saturating_sub(amount + fee);
        self.nonce += 1;
        self.last_updated = at_ms;
    }

    /// Apply a credit (receiver side).
    pub fn credit(&mut self, amount: u64, at_ms: u64) {
        self.balance = self.balance.saturating_add(amount);
        self.last_updated = at_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_spend_checks_balance_and_nonce() {
        let acct = AccountState {
            balance: 100,
            nonce: 5,
            ..Default::default()
        };
        assert!(acct.can_spend(90, 10, 5));
        assert!(!acct.can_spend(90, 11, 5), "balance too low");
        assert!(!acct.can_spend(90, 10, 6), "wrong nonce");
    }

    #[test]
    fn debit_credit_round_trip() {
        let mut sender = AccountState {
            balance: 1000,
            ..Default::default()
        };
        let mut receiver = AccountState::new();
        sender.debit(100, 1, 10);
        receiver.credit(100, 10);
        assert_eq!(sender.balance, 899);
        assert_eq!(sender.nonce, 1);
        assert_eq!(receiver.balance, 100);
    }
}

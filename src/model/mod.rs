//! Canonical data model (C2): blocks, transactions, VRF announcements,
//! account state, and the super-node set.

pub mod account;
pub mod announcement;
pub mod block;
pub mod merkle;
pub mod super_node;
pub mod transaction;

pub use account::AccountState;
pub use announcement::VRFAnnouncement;
pub use block::{Block, BlockSignature};
pub use super_node::{SuperNodeInfo, SuperNodeSet};
pub use transaction::{Transaction, TransactionType};

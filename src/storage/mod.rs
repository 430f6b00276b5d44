//! Persistent storage (§4.3): a single sled database, namespaced into
//! trees, fronting the block log and the account-state table.

pub mod block_store;
pub mod kv;
pub mod state_store;

pub use block_store::BlockStorage;
pub use kv::KvStore;
pub use state_store::{AccountStateView, StateStorage};

//! Error taxonomy for the node core.
//!
//! Mirrors the fault classes of the consensus design: crypto, format, and
//! validation faults are recovered locally by the caller (drop the
//! offending object); storage and configuration faults are fatal to the
//! round or the process respectively.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("VRF proof verification failed")]
    VrfVerificationFailed,
    #[error("invalid key material")]
    InvalidKey,
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("{field} has invalid length: expected {expected}, got {actual}")]
    BadLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{field} must be non-zero")]
    ZeroValue { field: &'static str },
    #[error("merkle root mismatch: block declares a root that does not match its transactions")]
    MerkleMismatch,
    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("block references unknown parent")]
    UnknownParent,
    #[error("VRF announcement failed verification")]
    InvalidAnnouncement,
    #[error("announcement round {0} does not match block round {1}")]
    RoundMismatch(u32, u32),
    #[error("announcement set below quorum floor: {have} < {need}")]
    QuorumNotMet { have: usize, need: usize },
    #[error("proposer is not the maximum-score announcement")]
    ProposerNotMax,
    #[error("rewarded_nodes does not match the deterministic top-N set")]
    BadRewardedSet,
    #[error("proof-of-work target not met")]
    PowNotMet,
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),
    #[error("score mismatch: recomputation diverges by more than epsilon")]
    ScoreMismatch,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to open {name} database: {source}")]
    DatabaseOpen {
        name: String,
        #[source]
        source: sled::Error,
    },
    #[error("database operation failed: {0}")]
    Operation(#[from] sled::Error),
    #[error("serialization failed: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("key not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("connection reset")]
    ConnectionReset,
    #[error("operation timed out")]
    Timeout,
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level error for the node binary's `main`.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("fatal consensus error: {0}")]
    Consensus(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

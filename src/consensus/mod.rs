//! The consensus engine (C9): VRF collection, proposer selection, block
//! production/validation, and signature aggregation.

pub mod engine;
pub mod pow;
pub mod round;
pub mod scoring;

pub use engine::{ConsensusEngine, RoundOutcome};
pub use round::RoundState;

//! Block synchronization between heights (§4.1, worked example 6): a
//! late node requests a height range, the peer answers with at most
//! `MAX_BLOCKS_PER_REQUEST` blocks, and the late node applies each one
//! only after checking it chains from its predecessor.

use crate::error::{StorageError, ValidationError};
use crate::model::block::Block;
use crate::storage::{BlockStorage, StateStorage};
use std::sync::Arc;

pub const MAX_BLOCKS_PER_REQUEST: u64 = 100;

pub struct SyncManager {
    blocks: Arc<BlockStorage>,
    state: Arc<StateStorage>,
}

impl SyncManager {
    pub fn new(blocks: Arc<BlockStorage>, state: Arc<StateStorage>) -> Self {
        Self { blocks, state }
    }

    /// Answer a `SyncRequest`: every stored block in `[from_height,
    /// to_height]`, capped at `MAX_BLOCKS_PER_REQUEST`.
    pub async fn build_response(
        &self,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<Block>, StorageError> {
        let capped_to = to_height.min(from_height.saturating_add(MAX_BLOCKS_PER_REQUEST - 1));
        let mut out = Vec::new();
        for height in from_height..=capped_to {
            match self.blocks.get_block(height).await? {
                Some(block) => out.push(block),
                None => break,
            }
        }
        Ok(out)
    }

    /// Apply a contiguous run of blocks received from a peer, verifying
    /// each against its predecessor before committing it. Stops (without
    /// error) at the first block that does not chain from the current
    /// tip, so a caller can issue a follow-up request for the remainder.
    ///
    /// Returns the height reached after applying as many blocks as
    /// chained validly.
    pub async fn apply_blocks(&self, blocks: Vec<Block>) -> Result<u64, ValidationError> {
        let mut tip_hash = self
            .blocks
            .latest_hash()
            .await
            .map_err(|_| ValidationError::UnknownParent)?;
        let mut tip_height = self
            .blocks
            .latest_height()
            .await
            .map_err(|_| ValidationError::UnknownParent)?
            .unwrap_or(0);

        for block in blocks {
            if let Some(expected_prev) = tip_hash {
                if block.previous_hash != expected_prev {
                    break;
                }
            }
            if tip_hash.is_some() && block.height != tip_height + 1 {
                break;
            }

            self.blocks
                .store_block(&block)
                .await
                .map_err(|_| ValidationError::UnknownParent)?;
            self.state
                .apply_block(&block)
                .await
                .map_err(|_| ValidationError::UnknownParent)?;

            tip_hash = Some(block.signing_digest());
            tip_height = block.height;
        }

        Ok(tip_height)
    }
}

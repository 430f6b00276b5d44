//! Block storage (§4.3): the canonical chain as a sled-backed append log,
//! mirrored by a bounded in-memory LRU so hot reads (recent tip, the
//! current round's parent) avoid a round-trip through sled.

use crate::error::StorageError;
use crate::model::block::Block;
use crate::storage::kv::KvStore;
use crate::types::Hash256;
use lru::LruCache;
use parking_lot::Mutex;

const BLOCK_NS: &str = "block";
const BLOCK_HASH_NS: &str = "block_hash";
const BLOCK_INDEX_NS: &str = "block_index";
const LATEST_KEY: &[u8] = b"latest";

/// In-memory mirror capacity; once exceeded, the least-recently-used 10%
/// is evicted in one batch rather than one entry at a time.
const CACHE_CAPACITY: usize = 1000;

struct BoundedCache {
    entries: Mutex<LruCache<Hash256, Block>>,
    capacity: usize,
}

impl BoundedCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            capacity,
        }
    }

    fn insert(&self, hash: Hash256, block: Block) {
        let mut entries = self.entries.lock();
        entries.put(hash, block);
        if entries.len() > self.capacity {
            let evict_n = (self.capacity / 10).max(1);
            for _ in 0..evict_n {
                if entries.pop_lru().is_none() {
                    break;
                }
            }
        }
    }

    fn get(&self, hash: &Hash256) -> Option<Block> {
        self.entries.lock().get(hash).cloned()
    }
}

pub struct BlockStorage {
    kv: KvStore,
    cache: BoundedCache,
}

impl BlockStorage {
    pub fn new(kv: KvStore) -> Self {
        Self {
            kv,
            cache: BoundedCache::new(CACHE_CAPACITY),
        }
    }

    /// Persist a finalized block and update the height/hash secondary
    /// indexes and the `latest` pointer. Idempotent: writing the same
    /// block twice is a no-op in effect (§4.10 step 7 retries this call).
    ///
    /// Keys follow §6's documented layout: `block:<height_decimal>` and
    /// `block:latest` hold the encoded block itself, `block_hash:<hex>`
    /// maps to the decimal height, and `block_index:<height_decimal>`
    /// maps to the hex hash.
    pub async fn store_block(&self, block: &Block) -> Result<(), StorageError> {
        let digest = block.signing_digest();
        let height = block.height;
        let height_key = height.to_string().into_bytes();
        let hash_hex = hex::encode(digest);

        self.kv.put(BLOCK_NS, height_key.clone(), block).await?;
        self.kv
            .put(BLOCK_HASH_NS, hash_hex.clone().into_bytes(), &height)
            .await?;
        self.kv
            .put(BLOCK_INDEX_NS, height_key, &hash_hex)
            .await?;
        self.kv.put(BLOCK_NS, LATEST_KEY.to_vec(), block).await?;

        self.cache.insert(digest, block.clone());
        Ok(())
    }

    pub async fn get_block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        self.kv
            .get(BLOCK_NS, height.to_string().into_bytes())
            .await
    }

    pub async fn get_block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, StorageError> {
        if let Some(block) = self.cache.get(hash) {
            return Ok(Some(block));
        }
        let height: Option<u64> = self
            .kv
            .get(BLOCK_HASH_NS, hex::encode(hash).into_bytes())
            .await?;
        match height {
            Some(h) => self.get_block(h).await,
            None => Ok(None),
        }
    }

    pub async fn latest_height(&self) -> Result<Option<u64>, StorageError> {
        let block: Option<Block> = self.kv.get(BLOCK_NS, LATEST_KEY.to_vec()).await?;
        Ok(block.map(|b| b.height))
    }

    pub async fn latest_hash(&self) -> Result<Option<Hash256>, StorageError> {
        let block: Option<Block> = self.kv.get(BLOCK_NS, LATEST_KEY.to_vec()).await?;
        Ok(block.map(|b| b.signing_digest()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::KvStore;

    fn sample_block(height: u64) -> Block {
        Block::new(
            height,
            1,
            1,
            [0; 32],
            [1; 32],
            [0; 32],
            [0; 64],
            vec![],
            vec![],
            0,
            vec![0xFF; 32],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn stores_and_retrieves_by_height_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(&dir.path().join("db")).unwrap();
        let storage = BlockStorage::new(kv);
        let block = sample_block(1);
        let digest = block.signing_digest();

        storage.store_block(&block).await.unwrap();

        let by_height = storage.get_block(1).await.unwrap().unwrap();
        assert_eq!(by_height.height, 1);

        let by_hash = storage.get_block_by_hash(&digest).await.unwrap().unwrap();
        assert_eq!(by_hash.height, 1);

        assert_eq!(storage.latest_height().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn unknown_height_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(&dir.path().join("db")).unwrap();
        let storage = BlockStorage::new(kv);
        assert!(storage.get_block(42).await.unwrap().is_none());
    }

    #[test]
    fn bounded_cache_evicts_in_batches_past_capacity() {
        let cache = BoundedCache::new(10);
        for i in 0..12u8 {
            cache.insert([i; 32], sample_block(i as u64));
        }
        // inserting the 11th and 12th entries over a capacity of 10
        // triggers one eviction batch of max(10/10, 1) = 1 each time.
        assert!(cache.entries.lock().len() <= 10);
    }
}

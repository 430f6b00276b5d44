//! Namespaced key-value access over a single `sled::Db` (§4.3).
//!
//! Each logical namespace (`"block"`, `"block_hash"`, `"block_index"`,
//! `"account"`, ...) maps to its own `sled::Tree`, so range scans and
//! iteration never cross namespaces.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::task::spawn_blocking;

#[derive(Clone)]
pub struct KvStore {
    db: sled::Db,
}

impl KvStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::HighThroughput)
            .flush_every_ms(Some(1000))
            .open()
            .map_err(|source| StorageError::DatabaseOpen {
                name: path.display().to_string(),
                source,
            })?;
        Ok(Self { db })
    }

    pub fn tree(&self, namespace: &'static str) -> Result<sled::Tree, StorageError> {
        Ok(self.db.open_tree(namespace)?)
    }

    /// Serialize and store `value` under `key` in `namespace`, off the
    /// async runtime thread.
    pub async fn put<T: Serialize + Send + 'static>(
        &self,
        namespace: &'static str,
        key: Vec<u8>,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = bincode::serialize(value)?;
        let tree = self.tree(namespace)?;
        spawn_blocking(move || tree.insert(key, bytes))
            .await
            .map_err(|e| StorageError::Operation(sled::Error::Io(std::io::Error::other(e))))??;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned + Send + 'static>(
        &self,
        namespace: &'static str,
        key: Vec<u8>,
    ) -> Result<Option<T>, StorageError> {
        let tree = self.tree(namespace)?;
        let raw = spawn_blocking(move || tree.get(key))
            .await
            .map_err(|e| StorageError::Operation(sled::Error::Io(std::io::Error::other(e))))??;
        match raw {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn remove(&self, namespace: &'static str, key: Vec<u8>) -> Result<(), StorageError> {
        let tree = self.tree(namespace)?;
        spawn_blocking(move || tree.remove(key))
            .await
            .map_err(|e| StorageError::Operation(sled::Error::Io(std::io::Error::other(e))))??;
        Ok(())
    }

    pub async fn exists(&self, namespace: &'static str, key: Vec<u8>) -> Result<bool, StorageError> {
        let tree = self.tree(namespace)?;
        let found = spawn_blocking(move || tree.contains_key(key))
            .await
            .map_err(|e| StorageError::Operation(sled::Error::Io(std::io::Error::other(e))))??;
        Ok(found)
    }

    /// Write every `(key, value)` pair in one atomic `sled::Batch` so a
    /// crash mid-write never leaves the namespace half-updated.
    pub async fn put_batch<T: Serialize + Send + 'static>(
        &self,
        namespace: &'static str,
        items: Vec<(Vec<u8>, T)>,
    ) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        for (key, value) in items {
            let bytes = bincode::serialize(&value)?;
            batch.insert(key, bytes);
        }
        let tree = self.tree(namespace)?;
        spawn_blocking(move || tree.apply_batch(batch))
            .await
            .map_err(|e| StorageError::Operation(sled::Error::Io(std::io::Error::other(e))))??;
        Ok(())
    }

    /// Every `(key, value)` pair currently stored in `namespace`. Used by
    /// cold-start rebuilds (e.g. re-deriving an index from its source
    /// tree); not on any per-round hot path.
    pub async fn scan_namespace<T: DeserializeOwned + Send + 'static>(
        &self,
        namespace: &'static str,
    ) -> Result<Vec<(Vec<u8>, T)>, StorageError> {
        let tree = self.tree(namespace)?;
        let raw: Result<Vec<(sled::IVec, sled::IVec)>, sled::Error> =
            spawn_blocking(move || tree.iter().collect())
                .await
                .map_err(|e| StorageError::Operation(sled::Error::Io(std::io::Error::other(e))))?;
        let mut out = Vec::new();
        for (key, bytes) in raw? {
            out.push((key.to_vec(), bincode::deserialize(&bytes)?));
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

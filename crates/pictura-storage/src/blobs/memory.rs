use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use pictura_core::{BlobStore, StoreError};

use super::clean_path;

/// Blob store held in process memory
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a blob exists at the path
    pub fn contains(&self, path: &str) -> bool {
        clean_path(path).is_some_and(|key| self.blobs.contains_key(&key))
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    fn key(path: &str) -> Result<String, StoreError> {
        clean_path(path).ok_or_else(|| StoreError::Io(format!("invalid blob path '{path}'")))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.insert(Self::key(path)?, bytes.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.get(&Self::key(path)?).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.blobs.remove(&Self::key(path)?).is_some())
    }

    fn url(&self, path: &str) -> String {
        format!("memory://{}", clean_path(path).unwrap_or_default())
    }

    fn local_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use pictura_core::{GenerationRecord, ProviderUsage, RecordFilter, RecordStore, StoreError};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Records, memory};

/// Record store persisted as a JSON array on disk
///
/// The whole set is loaded at open and rewritten after every mutation.
/// A mutation only becomes visible once its rewrite has succeeded.
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so a crash never leaves a truncated document.
pub struct JsonFileRecordStore {
    path: PathBuf,
    records: RwLock<Records>,
}

impl JsonFileRecordStore {
    /// Open the store, loading existing records if the file exists
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Records::new(),
            Ok(bytes) => {
                let list: Vec<GenerationRecord> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|record| (record.id(), record)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), records = records.len(), "opened record store");

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let list: Vec<&GenerationRecord> = records.values().collect();
        let json = serde_json::to_vec_pretty(&list)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn insert(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        memory::insert(&mut next, record)?;
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn update(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        memory::update(&mut next, record)?;
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<GenerationRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).filter(|r| !r.is_deleted()).cloned())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        if !memory::soft_delete(&mut next, id) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *records = next;
        Ok(true)
    }

    async fn latest(&self, limit: usize) -> Result<Vec<GenerationRecord>, StoreError> {
        Ok(super::latest(&*self.records.read().await, limit))
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        Ok(super::count(&*self.records.read().await, filter))
    }

    async fn sum_cost(&self, filter: &RecordFilter) -> Result<f64, StoreError> {
        Ok(super::sum_cost(&*self.records.read().await, filter))
    }

    async fn breakdown_by_provider(&self, filter: &RecordFilter) -> Result<IndexMap<String, ProviderUsage>, StoreError> {
        Ok(super::breakdown_by_provider(&*self.records.read().await, filter))
    }
}

use async_trait::async_trait;
use indexmap::IndexMap;
use pictura_core::{GenerationRecord, ProviderUsage, RecordFilter, RecordStore, StoreError};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Records;

/// Record store held in process memory
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Records>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, soft-deleted ones included
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

pub(super) fn insert(records: &mut Records, record: &GenerationRecord) -> Result<(), StoreError> {
    if records.contains_key(&record.id()) {
        return Err(StoreError::Duplicate(record.id()));
    }

    records.insert(record.id(), record.clone());
    Ok(())
}

pub(super) fn update(records: &mut Records, record: &GenerationRecord) -> Result<(), StoreError> {
    match records.get_mut(&record.id()) {
        Some(stored) if !stored.is_deleted() => {
            *stored = record.clone();
            Ok(())
        }
        _ => Err(StoreError::NotFound(record.id())),
    }
}

pub(super) fn soft_delete(records: &mut Records, id: Uuid) -> bool {
    match records.get_mut(&id) {
        Some(stored) if !stored.is_deleted() => {
            stored.mark_deleted();
            true
        }
        _ => false,
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        insert(&mut *self.records.write().await, record)
    }

    async fn update(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        update(&mut *self.records.write().await, record)
    }

    async fn find(&self, id: Uuid) -> Result<Option<GenerationRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).filter(|r| !r.is_deleted()).cloned())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(soft_delete(&mut *self.records.write().await, id))
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

//! Record and blob store implementations
//!
//! In-memory stores serve tests and single-shot runs; the JSON file record
//! store and the local disk blob store give the CLI durable history.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod blobs;
mod records;

use std::sync::Arc;

use pictura_config::{DiskConfig, RecordStoreConfig, StorageConfig};
use pictura_core::{BlobStore, RecordStore, StoreError};

pub use blobs::{local::LocalBlobStore, memory::MemoryBlobStore};
pub use records::{file::JsonFileRecordStore, memory::MemoryRecordStore};

/// Open the record store named by configuration
pub async fn open_record_store(config: &RecordStoreConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    let store: Arc<dyn RecordStore> = match config {
        RecordStoreConfig::Memory => Arc::new(MemoryRecordStore::new()),
        RecordStoreConfig::File(file) => Arc::new(JsonFileRecordStore::open(&file.path).await?),
    };

    Ok(store)
}

/// Build the blob store named by configuration
pub fn build_blob_store(config: &StorageConfig) -> Arc<dyn BlobStore> {
    match config.disk {
        DiskConfig::Local(ref local) => Arc::new(LocalBlobStore::new(local.root.clone(), local.public_url.clone())),
        DiskConfig::Memory => Arc::new(MemoryBlobStore::new()),
    }
}

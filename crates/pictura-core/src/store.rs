use std::path::PathBuf;

use async_trait::async_trait;
use indexmap::IndexMap;
use jiff::Timestamp;
use serde::Serialize;
use uuid::Uuid;

use crate::{GenerationRecord, GenerationStatus, StoreError};

/// Keyed store of generation records
///
/// Soft-deleted records are invisible to every read operation.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record
    async fn insert(&self, record: &GenerationRecord) -> Result<(), StoreError>;

    /// Replace the stored copy of an existing live record
    async fn update(&self, record: &GenerationRecord) -> Result<(), StoreError>;

    /// Look up a live record
    async fn find(&self, id: Uuid) -> Result<Option<GenerationRecord>, StoreError>;

    /// Soft-delete a record, returning false if it did not exist
    async fn soft_delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Most recently created records first
    async fn latest(&self, limit: usize) -> Result<Vec<GenerationRecord>, StoreError>;

    /// Number of records matching the filter
    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError>;

    /// Sum of `cost` over matching records
    async fn sum_cost(&self, filter: &RecordFilter) -> Result<f64, StoreError>;

    /// Count and cost of matching records grouped by provider
    async fn breakdown_by_provider(&self, filter: &RecordFilter) -> Result<IndexMap<String, ProviderUsage>, StoreError>;
}

/// Path-addressed binary storage for generated images
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write bytes at a path, replacing any existing blob
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Read the bytes at a path
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove a blob, returning false if nothing was stored there
    async fn delete(&self, path: &str) -> Result<bool, StoreError>;

    /// Public URL for a path
    fn url(&self, path: &str) -> String;

    /// Filesystem location for a path, when the store is disk-backed
    fn local_path(&self, path: &str) -> Option<PathBuf>;
}

/// Predicate over live records
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub status: Option<GenerationStatus>,
    pub provider: Option<String>,
    pub user_id: Option<String>,
    /// Only records created at or after this instant
    pub since: Option<Timestamp>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_status(mut self, status: GenerationStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub const fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Whether a record satisfies the filter
    pub fn matches(&self, record: &GenerationRecord) -> bool {
        !record.is_deleted()
            && self.status.is_none_or(|status| record.status() == status)
            && self.provider.as_deref().is_none_or(|provider| record.provider == provider)
            && self
                .user_id
                .as_deref()
                .is_none_or(|user| record.user_id.as_deref() == Some(user))
            && self.since.is_none_or(|since| record.created_at >= since)
    }
}

/// Aggregate usage for one provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    pub count: u64,
    pub total_cost: f64,
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;

    use super::*;
    use crate::{Completion, Options};

    #[test]
    fn filter_matches_status_provider_and_user() {
        let mut options = Options::new();
        options.insert("user_id".to_owned(), "u-1".into());
        let mut record = GenerationRecord::pending("stability", "mountains", options, None);
        record.complete(Completion::default()).unwrap();

        assert!(RecordFilter::all().matches(&record));
        assert!(RecordFilter::all().with_status(GenerationStatus::Completed).matches(&record));
        assert!(!RecordFilter::all().with_status(GenerationStatus::Failed).matches(&record));
        assert!(RecordFilter::all().with_provider("stability").matches(&record));
        assert!(!RecordFilter::all().with_provider("openai").matches(&record));
        assert!(RecordFilter::all().for_user("u-1").matches(&record));
        assert!(!RecordFilter::all().for_user("u-2").matches(&record));
    }

    #[test]
    fn filter_since_excludes_older_records() {
        let mut record = GenerationRecord::pending("openai", "old", Options::new(), None);
        record.created_at = Timestamp::now() - SignedDuration::from_hours(24 * 40);

        let recent = RecordFilter::all().since(Timestamp::now() - SignedDuration::from_hours(24 * 30));
        assert!(!recent.matches(&record));
        assert!(RecordFilter::all().matches(&record));
    }

    #[test]
    fn deleted_records_never_match() {
        let mut record = GenerationRecord::pending("openai", "gone", Options::new(), None);
        record.mark_deleted();
        assert!(!RecordFilter::all().matches(&record));
    }
}

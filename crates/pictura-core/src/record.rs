use std::{collections::BTreeMap, fmt, path::PathBuf};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{BlobStore, TransitionError};

/// Provider-specific call options (size, quality, seed, ...)
pub type Options = Map<String, Value>;

/// Lifecycle state of a generation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Created, backend has not answered (or was never called)
    Pending,
    /// Backend produced an image
    Completed,
    /// Backend call failed
    Failed,
}

impl GenerationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generation attempt
///
/// Status, error message and artifact fields only change through
/// [`complete`](Self::complete), [`fail`](Self::fail) and
/// [`attach_artifact`](Self::attach_artifact), which keep them consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    id: Uuid,
    /// Name of the provider that handled the attempt
    pub provider: String,
    pub prompt: String,
    /// Options exactly as supplied by the caller
    #[serde(default)]
    pub options: Options,
    /// Model or engine the request resolved to
    pub model: Option<String>,
    original_url: Option<String>,
    file_path: Option<String>,
    file_name: Option<String>,
    file_size: Option<u64>,
    mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Thumbnail paths keyed by size name
    #[serde(default)]
    pub thumbnails: BTreeMap<String, String>,
    status: GenerationStatus,
    error_message: Option<String>,
    /// Provider response echoes (seed, revised prompt, finish reason, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
    cost: Option<f64>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

/// Result fields written when a generation completes
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub original_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub metadata: Map<String, Value>,
    pub cost: Option<f64>,
}

/// A stored copy of the generated image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path inside the blob store
    pub path: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl GenerationRecord {
    /// Start a new pending attempt
    ///
    /// `user_id` and `session_id` are lifted out of the options when present.
    pub fn pending(provider: impl Into<String>, prompt: impl Into<String>, options: Options, model: Option<String>) -> Self {
        let now = Timestamp::now();
        let user_id = string_option(&options, "user_id");
        let session_id = string_option(&options, "session_id");

        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            prompt: prompt.into(),
            options,
            model,
            original_url: None,
            file_path: None,
            file_name: None,
            file_size: None,
            mime_type: None,
            width: None,
            height: None,
            thumbnails: BTreeMap::new(),
            status: GenerationStatus::Pending,
            error_message: None,
            metadata: Map::new(),
            cost: None,
            user_id,
            session_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn status(&self) -> GenerationStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn original_url(&self) -> Option<&str> {
        self.original_url.as_deref()
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub const fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub const fn cost(&self) -> Option<f64> {
        self.cost
    }

    pub const fn is_successful(&self) -> bool {
        matches!(self.status, GenerationStatus::Completed)
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self.status, GenerationStatus::Failed)
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self.status, GenerationStatus::Pending)
    }

    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Move a pending record to completed
    pub fn complete(&mut self, completion: Completion) -> Result<(), TransitionError> {
        self.transition(GenerationStatus::Completed)?;

        self.original_url = completion.original_url;
        self.width = completion.width.or(self.width);
        self.height = completion.height.or(self.height);
        self.metadata.extend(completion.metadata);
        self.cost = completion.cost.map(round_cost);

        Ok(())
    }

    /// Move a pending record to failed
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(GenerationStatus::Failed)?;

        let message = message.into();
        self.error_message = Some(if message.trim().is_empty() {
            "generation failed".to_owned()
        } else {
            message
        });

        Ok(())
    }

    /// Record where the downloaded image was stored
    pub fn attach_artifact(&mut self, artifact: Artifact) -> Result<(), TransitionError> {
        if self.status != GenerationStatus::Completed {
            return Err(TransitionError {
                id: self.id,
                from: self.status,
                to: GenerationStatus::Completed,
            });
        }

        self.file_path = Some(artifact.path);
        self.file_name = Some(artifact.name);
        self.file_size = Some(artifact.size);
        self.mime_type = Some(artifact.mime_type);
        self.updated_at = Timestamp::now();

        Ok(())
    }

    /// Set the public URL of the image when no backend-hosted one exists
    pub fn set_original_url(&mut self, url: impl Into<String>) -> Result<(), TransitionError> {
        if self.status != GenerationStatus::Completed {
            return Err(TransitionError {
                id: self.id,
                from: self.status,
                to: GenerationStatus::Completed,
            });
        }

        self.original_url = Some(url.into());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Flag the record as deleted
    pub fn mark_deleted(&mut self) {
        let now = Timestamp::now();
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    /// Every blob path this record owns
    pub fn owned_paths(&self) -> Vec<&str> {
        self.file_path
            .as_deref()
            .into_iter()
            .chain(self.thumbnails.values().map(String::as_str))
            .collect()
    }

    /// Stored copy URL, falling back to the backend URL
    pub fn url(&self, blobs: &dyn BlobStore) -> Option<String> {
        match self.file_path {
            Some(ref path) => Some(blobs.url(path)),
            None => self.original_url.clone(),
        }
    }

    /// Filesystem location of the stored copy, if the blob store has one
    pub fn full_path(&self, blobs: &dyn BlobStore) -> Option<PathBuf> {
        self.file_path.as_deref().and_then(|path| blobs.local_path(path))
    }

    /// Thumbnail URL for a size name, falling back to the image URL
    pub fn thumbnail_url(&self, size: &str, blobs: &dyn BlobStore) -> Option<String> {
        match self.thumbnails.get(size) {
            Some(path) => Some(blobs.url(path)),
            None => self.url(blobs),
        }
    }

    /// File size formatted for humans ("1.5 MB"), or "Unknown"
    #[allow(clippy::cast_precision_loss)]
    pub fn human_file_size(&self) -> String {
        const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

        let Some(size) = self.file_size.filter(|size| *size > 0) else {
            return "Unknown".to_owned();
        };

        let mut value = size as f64;
        let mut unit = 0;
        while value > 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }

        format!("{} {}", (value * 100.0).round() / 100.0, UNITS[unit])
    }

    fn transition(&mut self, to: GenerationStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                id: self.id,
                from: self.status,
                to,
            });
        }

        self.status = to;
        self.updated_at = Timestamp::now();
        Ok(())
    }
}

/// Round a monetary amount to 4 decimal places
pub fn round_cost(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn string_option(options: &Options, key: &str) -> Option<String> {
    match options.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

use std::path::PathBuf;

use serde::Deserialize;

/// Generation record store backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordStoreConfig {
    /// Records live in process memory
    #[default]
    Memory,
    /// Records are persisted to a JSON file
    File(FileRecordStoreConfig),
}

/// JSON file record store
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRecordStoreConfig {
    /// Path of the JSON file
    #[serde(default = "default_records_path")]
    pub path: PathBuf,
}

fn default_records_path() -> PathBuf {
    PathBuf::from("storage/ai_generated_images.json")
}

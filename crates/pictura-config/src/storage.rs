use std::path::PathBuf;

use serde::Deserialize;

use crate::default_true;

/// Where downloaded artifacts are written
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Disk backing the blob store
    #[serde(default)]
    pub disk: DiskConfig,
    /// Directory inside the disk that receives generated images
    #[serde(default = "default_path")]
    pub path: String,
    /// Download URL-hosted results after a successful generation
    #[serde(default = "default_true")]
    pub auto_download: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            disk: DiskConfig::default(),
            path: default_path(),
            auto_download: true,
        }
    }
}

/// Blob store disk
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiskConfig {
    /// Files on the local filesystem
    Local(LocalDiskConfig),
    /// Process memory (lost on exit)
    Memory,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self::Local(LocalDiskConfig::default())
    }
}

/// Local filesystem disk
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalDiskConfig {
    /// Root directory on disk
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// URL prefix under which the root is publicly served
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for LocalDiskConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            public_url: default_public_url(),
        }
    }
}

fn default_path() -> String {
    "ai-generated-images".to_owned()
}

fn default_root() -> PathBuf {
    PathBuf::from("storage/app/public")
}

fn default_public_url() -> String {
    "/storage".to_owned()
}

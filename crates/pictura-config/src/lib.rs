#![allow(clippy::must_use_candidate)]

mod env;
mod loader;
pub mod logging;
pub mod provider;
pub mod rate_limit;
pub mod records;
pub mod security;
pub mod server;
pub mod storage;

use indexmap::IndexMap;
use serde::Deserialize;

pub use logging::*;
pub use provider::*;
pub use rate_limit::*;
pub use records::*;
pub use security::*;
pub use server::*;
pub use storage::*;

/// Top-level Pictura configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Provider used when a call does not name one
    #[serde(default = "default_provider")]
    pub default: String,
    /// Image generation providers keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Blob storage for downloaded artifacts
    #[serde(default)]
    pub storage: StorageConfig,
    /// Generation record store
    #[serde(default)]
    pub records: RecordStoreConfig,
    /// Request rate limiting
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,
    /// Prompt validation and content filtering
    #[serde(default)]
    pub security: SecurityConfig,
    /// Logging switches and output format
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default: default_provider(),
            providers: IndexMap::new(),
            storage: StorageConfig::default(),
            records: RecordStoreConfig::default(),
            rate_limiting: RateLimitConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_owned()
}

pub(crate) const fn default_true() -> bool {
    true
}

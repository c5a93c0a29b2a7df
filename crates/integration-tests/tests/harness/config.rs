//! Programmatic configuration builder for integration tests

use std::path::Path;

use pictura_config::{
    Config, DiskConfig, LocalDiskConfig, ProviderConfig, RateLimitConfig, RecordStoreConfig, StorageConfig,
};
use secrecy::SecretString;

use super::mock_backend::{OPENAI_KEY, STABILITY_KEY};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder over in-memory stores with generous rate limits
    pub fn new() -> Self {
        Self {
            config: Config {
                storage: StorageConfig {
                    disk: DiskConfig::Memory,
                    ..StorageConfig::default()
                },
                records: RecordStoreConfig::Memory,
                rate_limiting: RateLimitConfig {
                    requests_per_minute: 100,
                    requests_per_hour: 1000,
                    ..RateLimitConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Add a DALL-E provider pointed at a mock backend
    pub fn with_openai_provider(mut self, name: &str, base_url: &str) -> Self {
        let mut provider = ProviderConfig::new("openai");
        provider.api_key = Some(SecretString::from(OPENAI_KEY));
        provider.api_url = Some(base_url.to_owned());
        provider.cost_per_image = Some(0.04);

        self.config.providers.insert(name.to_owned(), provider);
        self
    }

    /// Add a Stability provider pointed at a mock backend
    pub fn with_stability_provider(mut self, name: &str, base_url: &str) -> Self {
        let mut provider = ProviderConfig::new("stability");
        provider.api_key = Some(SecretString::from(STABILITY_KEY));
        provider.api_url = Some(base_url.to_owned());
        provider.cost_per_image = Some(0.02);

        self.config.providers.insert(name.to_owned(), provider);
        self
    }

    /// Set the provider used when a call names none
    pub fn with_default(mut self, name: &str) -> Self {
        name.clone_into(&mut self.config.default);
        self
    }

    /// Set per-minute and per-hour ceilings
    pub fn with_rate_limit(mut self, per_minute: u32, per_hour: u32) -> Self {
        self.config.rate_limiting.requests_per_minute = per_minute;
        self.config.rate_limiting.requests_per_hour = per_hour;
        self
    }

    pub fn with_auto_download(mut self, enabled: bool) -> Self {
        self.config.storage.auto_download = enabled;
        self
    }

    /// Store images on disk under `root`
    pub fn with_local_disk(mut self, root: &Path) -> Self {
        self.config.storage.disk = DiskConfig::Local(LocalDiskConfig {
            root: root.to_path_buf(),
            public_url: "http://images.test/storage".to_owned(),
        });
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}

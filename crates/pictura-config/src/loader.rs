use std::path::Path;

use crate::{Config, RateLimitStorage};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured, the default provider
    /// is missing, or limits and timeouts are zero
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_providers()?;
        self.validate_rate_limiting()?;
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one image generation provider must be configured");
        }

        if !self.providers.contains_key(&self.default) {
            anyhow::bail!("default provider '{}' is not configured", self.default);
        }

        for (name, provider) in &self.providers {
            if provider.driver.trim().is_empty() {
                anyhow::bail!("provider '{name}' must name a driver");
            }

            if provider.timeout == 0 {
                anyhow::bail!("provider '{name}' timeout must be greater than 0");
            }

            if provider.cost_per_image.is_some_and(|cost| cost < 0.0) {
                anyhow::bail!("provider '{name}' cost_per_image must not be negative");
            }
        }

        Ok(())
    }

    fn validate_rate_limiting(&self) -> anyhow::Result<()> {
        let limits = &self.rate_limiting;

        if !limits.enabled {
            return Ok(());
        }

        if limits.requests_per_minute == 0 || limits.requests_per_hour == 0 {
            anyhow::bail!("rate limits must be greater than 0 when rate limiting is enabled");
        }

        if let RateLimitStorage::Redis(ref redis) = limits.storage
            && redis.connect_timeout == 0
        {
            anyhow::bail!("rate_limiting.storage.connect_timeout must be greater than 0");
        }

        Ok(())
    }
}

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Configuration for a single image generation provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Driver that implements this provider (e.g. "openai", "stability")
    pub driver: String,
    /// API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub api_url: Option<String>,
    /// Default model (DALL-E style backends)
    #[serde(default)]
    pub model: Option<String>,
    /// Default engine (diffusion backends)
    #[serde(default)]
    pub engine: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Accepted for compatibility with existing config files; requests are never retried
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Options merged under every call's options
    #[serde(default)]
    pub default_options: Map<String, Value>,
    /// Price charged per generated image, recorded on completed generations
    #[serde(default)]
    pub cost_per_image: Option<f64>,
}

impl ProviderConfig {
    /// Create a provider entry for the given driver with everything else defaulted
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            api_key: None,
            api_url: None,
            model: None,
            engine: None,
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            default_options: Map::new(),
            cost_per_image: None,
        }
    }
}

const fn default_timeout() -> u64 {
    120
}

const fn default_max_retries() -> u32 {
    3
}

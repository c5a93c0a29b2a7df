pub(crate) mod openai;
pub(crate) mod stability;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use pictura_config::{Config, LoggingConfig, ProviderConfig, SecurityConfig};
use pictura_core::{BlobStore, GenerationRecord, Options, RecordStore};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    artifact::Archiver,
    error::{ApiError, ApiErrorKind, ImageGenError, Result},
    prompt::PromptPolicy,
};

/// Supported sizes grouped by model or orientation
pub type SizeGroups = &'static [(&'static str, &'static [&'static str])];

/// Drivers [`create_provider`] knows how to build
pub const DRIVERS: &[&str] = &[openai::DRIVER, stability::DRIVER];

/// One image generation backend
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate an image and return the terminal record
    ///
    /// The record is persisted before the backend is called. On a backend
    /// failure it is marked failed and persisted before the error is returned.
    async fn generate(&self, prompt: &str, options: Options) -> Result<GenerationRecord>;

    /// Validate and persist a pending record without calling the backend
    async fn generate_async(&self, prompt: &str, options: Options) -> Result<GenerationRecord>;

    fn validate_prompt(&self, prompt: &str) -> Result<()>;

    fn supported_sizes(&self) -> SizeGroups;

    fn supported_models(&self) -> &'static [&'static str];

    fn max_prompt_length(&self) -> usize;

    /// Whether the configured credential looks usable. Never touches the network.
    fn is_available(&self) -> bool;

    /// Configured provider name
    fn name(&self) -> &str;

    /// Driver implementing this provider
    fn driver(&self) -> &'static str;
}

/// Shared stores and policy handed to every adapter
#[derive(Clone)]
pub struct ProviderContext {
    records: Arc<dyn RecordStore>,
    archiver: Archiver,
    auto_download: bool,
    security: SecurityConfig,
    logging: LoggingConfig,
}

impl ProviderContext {
    pub fn new(config: &Config, records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            records,
            archiver: Archiver::new(blobs, &config.storage.path),
            auto_download: config.storage.auto_download,
            security: config.security.clone(),
            logging: config.logging.clone(),
        }
    }

    pub fn records(&self) -> &dyn RecordStore {
        self.records.as_ref()
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.archiver.blobs()
    }

    pub(crate) const fn logging(&self) -> &LoggingConfig {
        &self.logging
    }
}

/// Build the adapter for a configured provider entry
pub fn create_provider(name: &str, config: &ProviderConfig, context: &ProviderContext) -> Result<Arc<dyn ImageProvider>> {
    let provider: Arc<dyn ImageProvider> = match config.driver.as_str() {
        openai::DRIVER => Arc::new(openai::OpenAiProvider::new(name, config.clone(), context.clone())?),
        stability::DRIVER => Arc::new(stability::StabilityProvider::new(name, config.clone(), context.clone())?),
        other => {
            return Err(ImageGenError::Configuration(format!(
                "Unsupported provider driver '{other}' for provider '{name}'"
            )));
        }
    };

    Ok(provider)
}

/// State common to every HTTP adapter
struct Backend {
    name: String,
    /// Human-facing backend name used in messages
    label: &'static str,
    config: ProviderConfig,
    base_url: String,
    client: Client,
    context: ProviderContext,
    policy: PromptPolicy,
}

impl Backend {
    fn new(
        name: &str,
        label: &'static str,
        config: ProviderConfig,
        default_base_url: &str,
        max_prompt_length: usize,
        context: ProviderContext,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| ImageGenError::Configuration(format!("failed to build HTTP client for '{name}': {e}")))?;

        let base_url = config
            .api_url
            .as_deref()
            .unwrap_or(default_base_url)
            .trim_end_matches('/')
            .to_owned();

        Ok(Self {
            name: name.to_owned(),
            label,
            policy: PromptPolicy::new(max_prompt_length, &context.security),
            config,
            base_url,
            client,
            context,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn api_key(&self) -> Result<&SecretString> {
        self.config.api_key.as_ref().ok_or_else(|| {
            ImageGenError::Configuration(format!("API key required for provider '{}'", self.name))
        })
    }

    /// Credential heuristic shared by the backends
    fn credential_plausible(&self, placeholders: &[&str], accept: impl Fn(&str) -> bool) -> bool {
        self.config.api_key.as_ref().is_some_and(|key| {
            let key = key.expose_secret();
            !key.is_empty() && !placeholders.contains(&key) && accept(key)
        })
    }

    fn merged_options(&self, call: &Options) -> Options {
        crate::options::merge(&self.config.default_options, call)
    }

    #[allow(clippy::cast_precision_loss)]
    fn cost(&self, images: u64) -> Option<f64> {
        self.config.cost_per_image.map(|price| price * images as f64)
    }

    /// Create and persist the pending record
    async fn open(&self, prompt: &str, options: Options, model: String, size: (u32, u32)) -> Result<GenerationRecord> {
        let mut record = GenerationRecord::pending(&self.name, prompt, options, Some(model));
        record.width = Some(size.0);
        record.height = Some(size.1);

        self.context.records.insert(&record).await?;

        tracing::debug!(provider = %self.name, generation_id = %record.id(), "created pending generation");

        Ok(record)
    }

    /// Persist the record, removing its stored blobs if that fails
    async fn save(&self, record: &GenerationRecord) -> Result<()> {
        let Err(e) = self.context.records.update(record).await else {
            return Ok(());
        };

        for path in record.owned_paths() {
            match self.context.blobs().delete(path).await {
                Ok(_) => tracing::warn!(
                    provider = %self.name,
                    generation_id = %record.id(),
                    path = %path,
                    "removed image of unsaved generation"
                ),
                Err(delete_error) => tracing::error!(
                    provider = %self.name,
                    generation_id = %record.id(),
                    path = %path,
                    error = %delete_error,
                    "orphaned image of unsaved generation"
                ),
            }
        }

        Err(e.into())
    }

    /// Mark the record failed, persist it and hand the error back
    async fn fail(&self, record: &mut GenerationRecord, error: ImageGenError) -> ImageGenError {
        if let Err(e) = record.fail(error.to_string()) {
            tracing::error!(provider = %self.name, error = %e, "could not mark generation failed");
            return error;
        }

        if let Err(e) = self.context.records.update(record).await {
            tracing::error!(
                provider = %self.name,
                generation_id = %record.id(),
                error = %e,
                "failed to persist failed generation"
            );
        }

        if self.context.logging.enabled && self.context.logging.log_errors {
            tracing::error!(
                provider = %self.name,
                generation_id = %record.id(),
                prompt = %record.prompt,
                error = %error,
                "image generation failed"
            );
        }

        error
    }

    /// Archive image bytes onto a completed record; failures are logged only
    async fn archive(&self, record: &mut GenerationRecord, prefix: &str, bytes: &[u8]) -> bool {
        let artifact = match self.context.archiver.archive(record.id(), prefix, bytes).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!(
                    provider = %self.name,
                    generation_id = %record.id(),
                    error = %e,
                    "failed to store generated image"
                );
                return false;
            }
        };

        if let Err(e) = record.attach_artifact(artifact) {
            tracing::error!(provider = %self.name, error = %e, "could not attach artifact");
            return false;
        }

        true
    }

    /// Send a request and decode a successful JSON response
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        classify: fn(u16, Option<&Value>) -> ApiError,
    ) -> std::result::Result<T, ApiError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(provider = %self.name, error = %e, "image generation request failed");

            let message = if e.is_timeout() {
                format!("{} API request timed out", self.label)
            } else {
                format!("{} API request failed: {e}", self.label)
            };
            ApiError::new(ApiErrorKind::Backend, message)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            ApiError::new(ApiErrorKind::Backend, format!("{} API response could not be read: {e}", self.label))
                .with_status(status.as_u16())
        })?;

        if self.context.logging.enabled && self.context.logging.log_responses {
            tracing::debug!(
                provider = %self.name,
                status = %status,
                body = %String::from_utf8_lossy(&body),
                "backend response"
            );
        }

        if !status.is_success() {
            let payload = serde_json::from_slice::<Value>(&body).ok();

            tracing::error!(
                provider = %self.name,
                status = %status,
                "{} image generation API error",
                self.label
            );

            return Err(classify(status.as_u16(), payload.as_ref())
                .with_status(status.as_u16())
                .with_payload(payload));
        }

        serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(provider = %self.name, error = %e, "failed to parse image generation response");
            ApiError::new(ApiErrorKind::Backend, format!("{} API returned a malformed response: {e}", self.label))
                .with_status(status.as_u16())
        })
    }
}

/// `message` from a JSON error body, at the top level or under `error`
fn payload_message(payload: Option<&Value>) -> Option<&str> {
    let payload = payload?;

    payload
        .pointer("/error/message")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
}

use std::sync::Arc;

use indexmap::IndexMap;
use jiff::{SignedDuration, Timestamp};
use pictura_config::{Config, ProviderConfig};
use pictura_core::{BlobStore, GenerationRecord, GenerationStatus, Options, ProviderUsage, RecordFilter, RecordStore};
use pictura_ratelimit::{RateLimiter, WindowCounts};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{ImageGenError, Result},
    provider::{ImageProvider, ProviderContext, SizeGroups, create_provider},
};

const RECENT_WINDOW: SignedDuration = SignedDuration::from_hours(24 * 30);

/// Entry point for generating images and querying past generations
///
/// Cloning is cheap and clones share stores and rate limit counters.
/// [`provider`](Self::provider) returns a handle bound to another provider
/// without affecting the handle it was called on.
#[derive(Clone)]
pub struct Generator {
    shared: Arc<Shared>,
    active: Option<Arc<dyn ImageProvider>>,
}

struct Shared {
    config: Config,
    context: ProviderContext,
    limiter: RateLimiter,
}

#[derive(Debug, Clone, Copy)]
enum Dispatch {
    Sync,
    Queued,
}

/// Aggregate usage over live records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_generations: u64,
    pub successful_generations: u64,
    pub failed_generations: u64,
    pub pending_generations: u64,
    pub total_cost: f64,
    pub providers_used: Vec<String>,
    pub recent_activity: RecentActivity,
    pub provider_breakdown: IndexMap<String, ProviderUsage>,
}

/// Usage over the last 30 days
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentActivity {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub cost: f64,
}

/// Configured provider as shown by listings
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub driver: String,
    pub default: bool,
    pub available: bool,
    pub models: Vec<&'static str>,
    pub max_prompt_length: Option<usize>,
}

impl Generator {
    pub fn new(config: Config, records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>, limiter: RateLimiter) -> Self {
        let context = ProviderContext::new(&config, records, blobs);

        Self {
            shared: Arc::new(Shared {
                config,
                context,
                limiter,
            }),
            active: None,
        }
    }

    /// Handle bound to the named provider, or the configured default
    pub fn provider(&self, name: Option<&str>) -> Result<Self> {
        let adapter = self.provider_instance(name)?;

        Ok(Self {
            shared: Arc::clone(&self.shared),
            active: Some(adapter),
        })
    }

    /// Build the adapter for a provider, or the configured default
    pub fn provider_instance(&self, name: Option<&str>) -> Result<Arc<dyn ImageProvider>> {
        let name = name.unwrap_or(&self.shared.config.default);

        let config = self
            .shared
            .config
            .providers
            .get(name)
            .ok_or_else(|| ImageGenError::Configuration(format!("Provider '{name}' is not configured")))?;

        create_provider(name, config, &self.shared.context)
    }

    /// Name of the provider this handle dispatches to
    pub fn active_provider(&self) -> &str {
        self.active
            .as_ref()
            .map_or(self.shared.config.default.as_str(), |adapter| adapter.name())
    }

    fn current(&self) -> Result<Arc<dyn ImageProvider>> {
        match self.active {
            Some(ref adapter) => Ok(Arc::clone(adapter)),
            None => self.provider_instance(None),
        }
    }

    /// Generate an image synchronously
    pub async fn generate(&self, prompt: &str, options: Options) -> Result<GenerationRecord> {
        self.dispatch(prompt, options, Dispatch::Sync).await
    }

    /// Record a pending generation without calling the backend
    pub async fn generate_async(&self, prompt: &str, options: Options) -> Result<GenerationRecord> {
        self.dispatch(prompt, options, Dispatch::Queued).await
    }

    /// Run a dispatch under a rate limit reservation, released if it fails
    async fn dispatch(&self, prompt: &str, options: Options, mode: Dispatch) -> Result<GenerationRecord> {
        let reservation = self.shared.limiter.acquire().await?;

        let outcome = self.run(prompt, options, mode).await;
        if outcome.is_err() {
            self.shared.limiter.release(reservation).await;
        }

        outcome
    }

    async fn run(&self, prompt: &str, options: Options, mode: Dispatch) -> Result<GenerationRecord> {
        let adapter = self.current()?;

        match mode {
            Dispatch::Sync => {
                self.log_request(adapter.as_ref(), prompt, &options, "image generation requested");
                adapter.generate(prompt, options).await
            }
            Dispatch::Queued => {
                self.log_request(adapter.as_ref(), prompt, &options, "async image generation requested");
                adapter.generate_async(prompt, options).await
            }
        }
    }

    fn log_request(&self, adapter: &dyn ImageProvider, prompt: &str, options: &Options, message: &'static str) {
        let logging = self.shared.context.logging();
        if !(logging.enabled && logging.log_requests) {
            return;
        }

        let options = Value::Object(options.clone());

        tracing::info!(
            provider = %adapter.name(),
            prompt = %prompt,
            options = %options,
            "{message}"
        );
    }

    /// Names of configured providers in configuration order
    pub fn providers(&self) -> Vec<String> {
        self.shared.config.providers.keys().cloned().collect()
    }

    pub fn provider_config(&self, name: &str) -> Option<&ProviderConfig> {
        self.shared.config.providers.get(name)
    }

    pub fn default_provider(&self) -> &str {
        &self.shared.config.default
    }

    /// Describe every configured provider; entries with an unknown driver are
    /// listed as unavailable
    pub fn provider_summaries(&self) -> Vec<ProviderSummary> {
        self.shared
            .config
            .providers
            .iter()
            .map(|(name, config)| {
                let default = *name == self.shared.config.default;

                match create_provider(name, config, &self.shared.context) {
                    Ok(adapter) => ProviderSummary {
                        name: name.clone(),
                        driver: adapter.driver().to_owned(),
                        default,
                        available: adapter.is_available(),
                        models: adapter.supported_models().to_vec(),
                        max_prompt_length: Some(adapter.max_prompt_length()),
                    },
                    Err(_) => ProviderSummary {
                        name: name.clone(),
                        driver: config.driver.clone(),
                        default,
                        available: false,
                        models: Vec::new(),
                        max_prompt_length: None,
                    },
                }
            })
            .collect()
    }

    /// Check a prompt against the active provider's rules
    pub fn validate_prompt(&self, prompt: &str) -> Result<()> {
        self.current()?.validate_prompt(prompt)
    }

    pub fn supported_sizes(&self, name: Option<&str>) -> Result<SizeGroups> {
        let adapter = match name {
            Some(_) => self.provider_instance(name)?,
            None => self.current()?,
        };

        Ok(adapter.supported_sizes())
    }

    /// Most recent live generations first
    pub async fn generation_history(&self, limit: usize) -> Result<Vec<GenerationRecord>> {
        Ok(self.shared.context.records().latest(limit).await?)
    }

    pub async fn find_generation(&self, id: Uuid) -> Result<Option<GenerationRecord>> {
        Ok(self.shared.context.records().find(id).await?)
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.shared.context.blobs()
    }

    /// Current rate limit counters
    pub async fn rate_limit_counts(&self) -> Result<WindowCounts> {
        Ok(self.shared.limiter.counts().await?)
    }

    pub async fn usage_stats(&self) -> Result<UsageStats> {
        let records = self.shared.context.records();
        let all = RecordFilter::all();
        let recent = RecordFilter::all().since(Timestamp::now() - RECENT_WINDOW);

        let provider_breakdown = records.breakdown_by_provider(&all).await?;

        Ok(UsageStats {
            total_generations: records.count(&all).await?,
            successful_generations: records
                .count(&all.clone().with_status(GenerationStatus::Completed))
                .await?,
            failed_generations: records.count(&all.clone().with_status(GenerationStatus::Failed)).await?,
            pending_generations: records.count(&all.clone().with_status(GenerationStatus::Pending)).await?,
            total_cost: records.sum_cost(&all).await?,
            providers_used: provider_breakdown.keys().cloned().collect(),
            recent_activity: RecentActivity {
                total: records.count(&recent).await?,
                successful: records
                    .count(&recent.clone().with_status(GenerationStatus::Completed))
                    .await?,
                failed: records.count(&recent.clone().with_status(GenerationStatus::Failed)).await?,
                cost: records.sum_cost(&recent).await?,
            },
            provider_breakdown,
        })
    }

    /// Remove a generation's blobs and soft-delete the record
    ///
    /// Returns false when no live record has the id.
    pub async fn delete_generation(&self, id: Uuid) -> Result<bool> {
        let Some(record) = self.shared.context.records().find(id).await? else {
            return Ok(false);
        };

        for path in record.owned_paths() {
            if let Err(e) = self.blobs().delete(path).await {
                tracing::error!(generation_id = %id, path = %path, error = %e, "failed to delete image file");
            }
        }

        let deleted = self.shared.context.records().soft_delete(id).await?;

        if deleted {
            tracing::info!(generation_id = %id, "deleted generation");
        }

        Ok(deleted)
    }
}

#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod artifact;
mod error;
mod generator;
mod http;
mod options;
mod prompt;
mod provider;

use anyhow::Context;
use pictura_config::Config;

pub use error::{ApiError, ApiErrorKind, ImageGenError, Result};
pub use generator::{Generator, ProviderSummary, RecentActivity, UsageStats};
pub use http::endpoint_router;
pub use provider::{DRIVERS, ImageProvider, ProviderContext, SizeGroups, create_provider};

/// Build a generator over the stores and rate limiter named by configuration
pub async fn build_generator(config: &Config) -> anyhow::Result<Generator> {
    let records = pictura_storage::open_record_store(&config.records)
        .await
        .context("Failed to open generation record store")?;

    let blobs = pictura_storage::build_blob_store(&config.storage);

    let limiter =
        pictura_ratelimit::create_rate_limiter(&config.rate_limiting).context("Failed to initialize rate limiter")?;

    tracing::debug!(providers = config.providers.len(), "image generator ready");

    Ok(Generator::new(config.clone(), records, blobs, limiter))
}

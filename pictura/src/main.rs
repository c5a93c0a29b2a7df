#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod table;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::Context;
use args::{Args, Command, GenerateArgs};
use clap::Parser;
use pictura_config::Config;
use pictura_core::GenerationRecord;
use pictura_imagegen::Generator;
use serde_json::Value;
use table::Table;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000);
const PROMPT_PREVIEW: usize = 48;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let default_filter = if matches!(args.command, Command::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    pictura_telemetry::init(&config.logging, default_filter)?;

    tracing::debug!(config_path = %args.config.display(), "configuration loaded");

    let generator = pictura_imagegen::build_generator(&config).await?;

    match args.command {
        Command::Generate(generate) => run_generate(&generator, &generate).await,
        Command::Providers => {
            list_providers(&generator);
            Ok(())
        }
        Command::History { limit } => history(&generator, limit).await,
        Command::Show { id } => show(&generator, id).await,
        Command::Delete { id } => delete(&generator, id).await,
        Command::Stats => stats(&generator).await,
        Command::Serve { listen } => {
            let address = listen.or(config.server.listen_address).unwrap_or(DEFAULT_LISTEN);
            serve(generator, address).await
        }
    }
}

async fn run_generate(generator: &Generator, args: &GenerateArgs) -> anyhow::Result<()> {
    let generator = match args.provider.as_deref() {
        Some(name) => generator.provider(Some(name))?,
        None => generator.clone(),
    };

    let options = args.options();

    let record = if args.queue_only {
        println!("Queueing generation with {}...", generator.active_provider());
        generator.generate_async(&args.prompt, options).await?
    } else {
        println!("Generating image with {}...", generator.active_provider());
        generator.generate(&args.prompt, options).await?
    };

    print!("{}", record_table(&generator, &record));

    if let Some(path) = record.full_path(generator.blobs()) {
        println!("Saved to {}", path.display());
    } else if let Some(url) = record.url(generator.blobs()) {
        println!("Image URL: {url}");
    }

    Ok(())
}

fn list_providers(generator: &Generator) {
    let mut table = Table::new(["Name", "Driver", "Default", "Available", "Models"]);

    for summary in generator.provider_summaries() {
        table.row([
            summary.name,
            summary.driver,
            yes_no(summary.default).to_owned(),
            yes_no(summary.available).to_owned(),
            summary.models.join(", "),
        ]);
    }

    print!("{table}");
}

async fn history(generator: &Generator, limit: usize) -> anyhow::Result<()> {
    let records = generator.generation_history(limit).await?;

    if records.is_empty() {
        println!("No generations yet");
        return Ok(());
    }

    let mut table = Table::new(["ID", "Provider", "Status", "Prompt", "Created"]);

    for record in &records {
        table.row([
            record.id().to_string(),
            record.provider.clone(),
            record.status().to_string(),
            preview(&record.prompt),
            record.created_at.to_string(),
        ]);
    }

    print!("{table}");
    Ok(())
}

async fn show(generator: &Generator, id: Uuid) -> anyhow::Result<()> {
    let record = generator
        .find_generation(id)
        .await?
        .with_context(|| format!("Generation '{id}' not found"))?;

    print!("{}", record_table(generator, &record));
    Ok(())
}

async fn delete(generator: &Generator, id: Uuid) -> anyhow::Result<()> {
    if !generator.delete_generation(id).await? {
        anyhow::bail!("Generation '{id}' not found");
    }

    println!("Deleted generation {id}");
    Ok(())
}

async fn stats(generator: &Generator) -> anyhow::Result<()> {
    let stats = generator.usage_stats().await?;

    let mut table = Table::properties();
    table
        .row(["Total generations".to_owned(), stats.total_generations.to_string()])
        .row(["Successful".to_owned(), stats.successful_generations.to_string()])
        .row(["Failed".to_owned(), stats.failed_generations.to_string()])
        .row(["Pending".to_owned(), stats.pending_generations.to_string()])
        .row(["Total cost".to_owned(), format_cost(stats.total_cost)])
        .row(["Providers used".to_owned(), stats.providers_used.join(", ")])
        .row(["Last 30 days".to_owned(), stats.recent_activity.total.to_string()])
        .row(["Last 30 days cost".to_owned(), format_cost(stats.recent_activity.cost)]);
    print!("{table}");

    if !stats.provider_breakdown.is_empty() {
        let mut breakdown = Table::new(["Provider", "Generations", "Cost"]);
        for (provider, usage) in &stats.provider_breakdown {
            breakdown.row([provider.clone(), usage.count.to_string(), format_cost(usage.total_cost)]);
        }
        print!("{breakdown}");
    }

    Ok(())
}

async fn serve(generator: Generator, address: SocketAddr) -> anyhow::Result<()> {
    let app = pictura_imagegen::endpoint_router().with_state(generator);

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(address = %listener.local_addr()?, "pictura listening");

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server error")?;

    tracing::info!("pictura stopped");
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}

fn record_table(generator: &Generator, record: &GenerationRecord) -> Table {
    let mut table = Table::properties();

    table
        .row(["ID".to_owned(), record.id().to_string()])
        .row(["Provider".to_owned(), record.provider.clone()])
        .row(["Status".to_owned(), record.status().to_string()])
        .row(["Prompt".to_owned(), record.prompt.clone()]);

    if let Some(ref model) = record.model {
        table.row(["Model".to_owned(), model.clone()]);
    }

    if let (Some(width), Some(height)) = (record.width, record.height) {
        table.row(["Size".to_owned(), format!("{width}x{height}")]);
    }

    table.row(["File size".to_owned(), record.human_file_size()]);

    if let Some(mime_type) = record.mime_type() {
        table.row(["MIME type".to_owned(), mime_type.to_owned()]);
    }

    if let Some(cost) = record.cost() {
        table.row(["Cost".to_owned(), format_cost(cost)]);
    }

    if let Some(url) = record.url(generator.blobs()) {
        table.row(["URL".to_owned(), url]);
    }

    if let Some(revised) = record.metadata.get("revised_prompt").and_then(Value::as_str) {
        table.row(["Revised prompt".to_owned(), revised.to_owned()]);
    }

    if let Some(message) = record.error_message() {
        table.row(["Error".to_owned(), message.to_owned()]);
    }

    table.row(["Created".to_owned(), record.created_at.to_string()]);

    table
}

fn preview(prompt: &str) -> String {
    if prompt.chars().count() <= PROMPT_PREVIEW {
        return prompt.to_owned();
    }

    let mut short: String = prompt.chars().take(PROMPT_PREVIEW - 3).collect();
    short.push_str("...");
    short
}

fn format_cost(cost: f64) -> String {
    format!("${cost:.4}")
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};
use pictura_core::Options;
use serde_json::Value;
use uuid::Uuid;

/// Pictura image generation
#[derive(Debug, Parser)]
#[command(name = "pictura", about = "Generate images with DALL-E and Stable Diffusion and track every generation")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "pictura.toml", env = "PICTURA_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate an image from a prompt
    Generate(GenerateArgs),
    /// List configured providers
    Providers,
    /// Show the most recent generations
    History {
        /// Number of generations to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Show one generation
    Show { id: Uuid },
    /// Delete a generation and its stored images
    Delete { id: Uuid },
    /// Show usage statistics
    Stats,
    /// Serve the HTTP API
    Serve {
        /// Override the listen address
        #[arg(long, env = "PICTURA_LISTEN")]
        listen: Option<SocketAddr>,
    },
}

#[derive(Debug, clap::Args)]
pub struct GenerateArgs {
    /// Text description of the image
    pub prompt: String,

    /// Provider to use instead of the configured default
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Image size, e.g. 1024x1024
    #[arg(short, long)]
    pub size: Option<String>,

    #[arg(short, long)]
    pub model: Option<String>,

    /// Image quality (standard or hd)
    #[arg(short, long)]
    pub quality: Option<String>,

    /// Image style (vivid or natural)
    #[arg(long)]
    pub style: Option<String>,

    /// Store the image locally
    #[arg(long, conflicts_with = "no_download")]
    pub download: bool,

    /// Keep only the backend URL
    #[arg(long)]
    pub no_download: bool,

    /// Record a pending generation without calling the backend
    #[arg(long = "async")]
    pub queue_only: bool,
}

impl GenerateArgs {
    /// Call options carried by the flags
    pub fn options(&self) -> Options {
        let mut options = Options::new();

        let strings = [
            ("size", &self.size),
            ("model", &self.model),
            ("quality", &self.quality),
            ("style", &self.style),
        ];

        for (key, value) in strings {
            if let Some(value) = value {
                options.insert(key.to_owned(), Value::String(value.clone()));
            }
        }

        if self.download {
            options.insert("download".to_owned(), Value::Bool(true));
        } else if self.no_download {
            options.insert("download".to_owned(), Value::Bool(false));
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn generate_flags_become_options() {
        let args = Args::try_parse_from([
            "pictura",
            "generate",
            "a lighthouse at dusk",
            "--size",
            "1792x1024",
            "--quality",
            "hd",
            "--no-download",
        ])
        .unwrap();

        let Command::Generate(generate) = args.command else {
            panic!("expected generate");
        };

        assert_eq!(generate.prompt, "a lighthouse at dusk");
        assert_eq!(
            Value::Object(generate.options()),
            json!({ "size": "1792x1024", "quality": "hd", "download": false })
        );
    }

    #[test]
    fn download_flags_conflict() {
        let result = Args::try_parse_from(["pictura", "generate", "x", "--download", "--no-download"]);
        assert!(result.is_err());
    }

    #[test]
    fn ids_must_be_uuids() {
        assert!(Args::try_parse_from(["pictura", "show", "not-an-id"]).is_err());
        assert!(Args::try_parse_from(["pictura", "delete", "67e55044-10b1-426f-9247-bb680e5fe0c8"]).is_ok());
    }
}

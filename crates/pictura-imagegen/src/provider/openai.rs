use async_trait::async_trait;
use pictura_config::ProviderConfig;
use pictura_core::{Completion, GenerationRecord, Options};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Backend, ImageProvider, ProviderContext, SizeGroups, payload_message};
use crate::{
    artifact,
    error::{ApiError, ApiErrorKind, ImageGenError, Result},
    options,
};

pub(crate) const DRIVER: &str = "openai";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "dall-e-3";
const DEFAULT_SIZE: &str = "1024x1024";
const MAX_PROMPT_LENGTH: usize = 4000;

const MODELS: &[&str] = &["dall-e-2", "dall-e-3"];
const SIZES: SizeGroups = &[
    ("dall-e-2", &["256x256", "512x512", "1024x1024"]),
    ("dall-e-3", &["1024x1024", "1024x1792", "1792x1024"]),
];
const PLACEHOLDER_KEYS: &[&str] = &["your-openai-api-key-here", "test-key-for-development", "sk-test", "sk-fake"];

/// DALL-E image generation
pub(crate) struct OpenAiProvider {
    backend: Backend,
}

/// Wire format for the `OpenAI` image generation request
#[derive(Debug, Serialize)]
struct OpenAiImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    quality: String,
    response_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<String>,
}

/// Wire format for the `OpenAI` image generation response
#[derive(Deserialize)]
struct OpenAiImageResponse {
    created: Option<u64>,
    #[serde(default)]
    data: Vec<OpenAiImageData>,
}

#[derive(Deserialize)]
struct OpenAiImageData {
    url: Option<String>,
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

/// A validated request plus what the record needs from it
struct Prepared {
    wire: OpenAiImageRequest,
    dimensions: (u32, u32),
    download: bool,
}

impl OpenAiProvider {
    pub fn new(name: &str, config: ProviderConfig, context: ProviderContext) -> Result<Self> {
        Ok(Self {
            backend: Backend::new(name, "OpenAI", config, DEFAULT_BASE_URL, MAX_PROMPT_LENGTH, context)?,
        })
    }

    fn prepare(&self, prompt: &str, call: &Options) -> Result<Prepared> {
        self.backend.policy.check(prompt)?;

        let merged = self.backend.merged_options(call);

        let model = options::string(&merged, "model")
            .or(self.backend.config.model.as_deref())
            .unwrap_or(DEFAULT_MODEL)
            .to_owned();

        let size = options::string(&merged, "size").unwrap_or(DEFAULT_SIZE).to_owned();
        let dimensions = options::parse_size(&size)?;

        let n = match options::unsigned(&merged, "n")? {
            None => 1,
            Some(n) => u32::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ImageGenError::InvalidOptions(format!("option 'n' must be a positive count, got {n}")))?,
        };

        // only dall-e-3 understands style
        let style = if model == "dall-e-3" {
            options::string(&merged, "style").map(str::to_owned)
        } else {
            None
        };

        Ok(Prepared {
            wire: OpenAiImageRequest {
                prompt: prompt.to_owned(),
                n,
                size,
                quality: options::string(&merged, "quality").unwrap_or("standard").to_owned(),
                response_format: options::string(&merged, "response_format").unwrap_or("url").to_owned(),
                style,
                model,
            },
            dimensions,
            download: options::flag(&merged, "download").unwrap_or(self.backend.context.auto_download),
        })
    }

    async fn request(
        &self,
        wire: &OpenAiImageRequest,
        api_key: &SecretString,
    ) -> std::result::Result<(OpenAiImageData, Option<u64>), ApiError> {
        let request = self
            .backend
            .client
            .post(self.backend.url("images/generations"))
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .json(wire);

        tracing::debug!(
            provider = %self.backend.name,
            model = %wire.model,
            size = %wire.size,
            "sending image generation request"
        );

        let response: OpenAiImageResponse = self.backend.send(request, classify).await?;

        let image = response
            .data
            .into_iter()
            .next()
            .filter(|image| image.url.is_some() || image.b64_json.is_some())
            .ok_or_else(|| ApiError::new(ApiErrorKind::Backend, "No image data received from OpenAI").with_status(200))?;

        Ok((image, response.created))
    }

    /// Fetch or decode the image and attach it to the record
    async fn store_image(&self, record: &mut GenerationRecord, image: &OpenAiImageData) -> Result<()> {
        let bytes = match (&image.b64_json, &image.url) {
            (Some(encoded), _) => artifact::decode_base64(encoded),
            (None, Some(url)) => artifact::download(&self.backend.client, url).await,
            (None, None) => return Ok(()),
        };

        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(
                    provider = %self.backend.name,
                    generation_id = %record.id(),
                    original_url = ?record.original_url(),
                    error = %e,
                    "failed to download generated image"
                );
                return Ok(());
            }
        };

        if self.backend.archive(record, "", &bytes).await {
            self.backend.save(record).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    async fn generate(&self, prompt: &str, options: Options) -> Result<GenerationRecord> {
        let prepared = self.prepare(prompt, &options)?;
        let api_key = self.backend.api_key()?;

        let mut record = self
            .backend
            .open(prompt, options, prepared.wire.model.clone(), prepared.dimensions)
            .await?;

        let (image, created) = match self.request(&prepared.wire, api_key).await {
            Ok(result) => result,
            Err(error) => return Err(self.backend.fail(&mut record, error.into()).await),
        };

        let mut metadata = Map::new();
        if let Some(revised) = image.revised_prompt.as_ref().filter(|revised| !revised.is_empty()) {
            metadata.insert("revised_prompt".to_owned(), Value::from(revised.as_str()));
        }
        if let Some(created) = created {
            metadata.insert("created".to_owned(), Value::from(created));
        }

        record.complete(Completion {
            original_url: image.url.clone(),
            width: Some(prepared.dimensions.0),
            height: Some(prepared.dimensions.1),
            metadata,
            cost: self.backend.cost(u64::from(prepared.wire.n)),
        })?;
        self.backend.save(&record).await?;

        tracing::debug!(provider = %self.backend.name, generation_id = %record.id(), "image generation complete");

        if prepared.download {
            self.store_image(&mut record, &image).await?;
        }

        Ok(record)
    }

    async fn generate_async(&self, prompt: &str, options: Options) -> Result<GenerationRecord> {
        let prepared = self.prepare(prompt, &options)?;
        self.backend.api_key()?;

        self.backend
            .open(prompt, options, prepared.wire.model, prepared.dimensions)
            .await
    }

    fn validate_prompt(&self, prompt: &str) -> Result<()> {
        self.backend.policy.check(prompt)
    }

    fn supported_sizes(&self) -> SizeGroups {
        SIZES
    }

    fn supported_models(&self) -> &'static [&'static str] {
        MODELS
    }

    fn max_prompt_length(&self) -> usize {
        self.backend.policy.max_length()
    }

    fn is_available(&self) -> bool {
        self.backend
            .credential_plausible(PLACEHOLDER_KEYS, |key| key.starts_with("sk-") && key.len() > 40)
    }

    fn name(&self) -> &str {
        &self.backend.name
    }

    fn driver(&self) -> &'static str {
        DRIVER
    }
}

/// Map an `OpenAI` error status to the normalized taxonomy
fn classify(status: u16, payload: Option<&Value>) -> ApiError {
    let code = payload.and_then(|p| p.pointer("/error/code")).and_then(Value::as_str);
    let out_of_quota = status == 402 || (status == 429 && code == Some("insufficient_quota"));

    match status {
        401 => ApiError::new(
            ApiErrorKind::Unauthorized,
            "Invalid OpenAI API key. Please check your API key configuration.",
        ),
        _ if out_of_quota => ApiError::new(
            ApiErrorKind::InsufficientFunds,
            "OpenAI account has insufficient quota. Please check your plan and billing details.",
        ),
        429 => ApiError::new(
            ApiErrorKind::RateLimited,
            "OpenAI API rate limit exceeded. Please try again later.",
        ),
        400 => ApiError::new(
            ApiErrorKind::MalformedRequest,
            payload_message(payload).map_or_else(
                || "Invalid request to OpenAI API. Please check your prompt and options.".to_owned(),
                |message| format!("OpenAI API error: {message}"),
            ),
        ),
        404 => ApiError::new(
            ApiErrorKind::Backend,
            "OpenAI API endpoint not found. This might indicate an invalid API key or deprecated endpoint.",
        ),
        other => ApiError::new(
            ApiErrorKind::Backend,
            format!("OpenAI API request failed with status {other}"),
        ),
    }
}

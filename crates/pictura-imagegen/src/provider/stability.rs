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

pub(crate) const DRIVER: &str = "stability";

const DEFAULT_BASE_URL: &str = "https://api.stability.ai/v1";
const DEFAULT_ENGINE: &str = "stable-diffusion-xl-1024-v1-0";
const DEFAULT_DIMENSION: u32 = 1024;
const DEFAULT_CFG_SCALE: f64 = 7.0;
const DEFAULT_STEPS: u64 = 30;
const MAX_PROMPT_LENGTH: usize = 2000;
const ARTIFACT_PREFIX: &str = "stability_";

const MODELS: &[&str] = &[
    "stable-diffusion-xl-1024-v1-0",
    "stable-diffusion-v1-6",
    "stable-diffusion-512-v2-1",
];
const SIZES: SizeGroups = &[
    ("square", &["1024x1024", "512x512"]),
    ("portrait", &["768x1344", "768x1152", "832x1216"]),
    ("landscape", &["1344x768", "1152x768", "1216x832"]),
];
const PLACEHOLDER_KEYS: &[&str] = &["your-stability-api-key-here", "test-key-for-development", "sk-test", "sk-fake"];

/// Stable Diffusion text-to-image
pub(crate) struct StabilityProvider {
    backend: Backend,
}

#[derive(Debug, Serialize)]
struct TextPrompt {
    text: String,
    weight: f64,
}

/// Wire format for the text-to-image request
#[derive(Debug, Serialize)]
struct StabilityRequest {
    text_prompts: Vec<TextPrompt>,
    cfg_scale: f64,
    height: u32,
    width: u32,
    samples: u32,
    steps: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style_preset: Option<String>,
}

/// Wire format for the text-to-image response
#[derive(Deserialize)]
struct StabilityResponse {
    #[serde(default)]
    artifacts: Vec<StabilityArtifact>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StabilityArtifact {
    base64: Option<String>,
    seed: Option<u64>,
    finish_reason: Option<String>,
}

struct Prepared {
    engine: String,
    wire: StabilityRequest,
}

impl StabilityProvider {
    pub fn new(name: &str, config: ProviderConfig, context: ProviderContext) -> Result<Self> {
        Ok(Self {
            backend: Backend::new(name, "Stability AI", config, DEFAULT_BASE_URL, MAX_PROMPT_LENGTH, context)?,
        })
    }

    fn prepare(&self, prompt: &str, call: &Options) -> Result<Prepared> {
        self.backend.policy.check(prompt)?;

        let merged = self.backend.merged_options(call);

        let engine = options::string(&merged, "model")
            .or(self.backend.config.engine.as_deref())
            .unwrap_or(DEFAULT_ENGINE)
            .to_owned();

        let (width, height) = match options::string(&merged, "size") {
            Some(size) => options::parse_size(size)?,
            None => (
                dimension(&merged, "width")?.unwrap_or(DEFAULT_DIMENSION),
                dimension(&merged, "height")?.unwrap_or(DEFAULT_DIMENSION),
            ),
        };

        let mut text_prompts = vec![TextPrompt {
            text: prompt.to_owned(),
            weight: 1.0,
        }];
        if let Some(negative) = options::string(&merged, "negative_prompt") {
            text_prompts.push(TextPrompt {
                text: negative.to_owned(),
                weight: -1.0,
            });
        }

        Ok(Prepared {
            engine,
            wire: StabilityRequest {
                text_prompts,
                cfg_scale: options::number(&merged, "cfg_scale")?.unwrap_or(DEFAULT_CFG_SCALE),
                height,
                width,
                samples: 1,
                steps: options::unsigned(&merged, "steps")?.unwrap_or(DEFAULT_STEPS),
                seed: options::unsigned(&merged, "seed")?,
                style_preset: options::string(&merged, "style_preset").map(str::to_owned),
            },
        })
    }

    async fn request(&self, prepared: &Prepared, api_key: &SecretString) -> std::result::Result<(Vec<u8>, Map<String, Value>), ApiError> {
        let request = self
            .backend
            .client
            .post(self.backend.url(&format!("generation/{}/text-to-image", prepared.engine)))
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .header("Accept", "application/json")
            .json(&prepared.wire);

        tracing::debug!(
            provider = %self.backend.name,
            engine = %prepared.engine,
            width = prepared.wire.width,
            height = prepared.wire.height,
            "sending image generation request"
        );

        let response: StabilityResponse = self.backend.send(request, classify).await?;

        let first = response
            .artifacts
            .into_iter()
            .next()
            .filter(|candidate| candidate.base64.as_deref().is_some_and(|data| !data.is_empty()));
        let Some(StabilityArtifact {
            base64: Some(encoded),
            seed,
            finish_reason,
        }) = first
        else {
            return Err(
                ApiError::new(ApiErrorKind::Backend, "No image data received from Stability AI").with_status(200)
            );
        };

        let bytes = artifact::decode_base64(&encoded).map_err(|e| {
            ApiError::new(ApiErrorKind::Backend, format!("Stability AI returned an unreadable image: {e}")).with_status(200)
        })?;

        let mut metadata = Map::new();
        if let Some(seed) = seed {
            metadata.insert("seed".to_owned(), Value::from(seed));
        }
        if let Some(reason) = finish_reason {
            metadata.insert("finish_reason".to_owned(), Value::from(reason));
        }

        Ok((bytes, metadata))
    }
}

#[async_trait]
impl ImageProvider for StabilityProvider {
    async fn generate(&self, prompt: &str, options: Options) -> Result<GenerationRecord> {
        let prepared = self.prepare(prompt, &options)?;
        let api_key = self.backend.api_key()?;

        let dimensions = (prepared.wire.width, prepared.wire.height);
        let mut record = self
            .backend
            .open(prompt, options, prepared.engine.clone(), dimensions)
            .await?;

        let (bytes, metadata) = match self.request(&prepared, api_key).await {
            Ok(result) => result,
            Err(error) => return Err(self.backend.fail(&mut record, error.into()).await),
        };

        record.complete(Completion {
            original_url: None,
            width: Some(dimensions.0),
            height: Some(dimensions.1),
            metadata,
            cost: self.backend.cost(1),
        })?;

        // the backend keeps no copy, so the archived blob is the only image
        if self.backend.archive(&mut record, ARTIFACT_PREFIX, &bytes).await {
            let url = record.file_path().map(|path| self.backend.context.blobs().url(path));
            if let Some(url) = url {
                record.set_original_url(url)?;
            }
        }

        self.backend.save(&record).await?;

        tracing::debug!(provider = %self.backend.name, generation_id = %record.id(), "image generation complete");

        Ok(record)
    }

    async fn generate_async(&self, prompt: &str, options: Options) -> Result<GenerationRecord> {
        let prepared = self.prepare(prompt, &options)?;
        self.backend.api_key()?;

        let dimensions = (prepared.wire.width, prepared.wire.height);
        self.backend.open(prompt, options, prepared.engine, dimensions).await
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
            .credential_plausible(PLACEHOLDER_KEYS, |key| key.starts_with("sk-") && key.len() >= 32)
    }

    fn name(&self) -> &str {
        &self.backend.name
    }

    fn driver(&self) -> &'static str {
        DRIVER
    }
}

fn dimension(options: &Options, key: &str) -> Result<Option<u32>> {
    options::unsigned(options, key)?
        .map(|value| {
            u32::try_from(value)
                .ok()
                .filter(|value| *value > 0)
                .ok_or_else(|| ImageGenError::InvalidOptions(format!("option '{key}' must be a positive pixel count")))
        })
        .transpose()
}

/// Map a Stability error status to the normalized taxonomy
fn classify(status: u16, payload: Option<&Value>) -> ApiError {
    match status {
        401 => ApiError::new(
            ApiErrorKind::Unauthorized,
            "Invalid Stability AI API key. Please check your API key configuration.",
        ),
        402 => ApiError::new(
            ApiErrorKind::InsufficientFunds,
            "Stability AI account has insufficient credits. Please add credits to your account.",
        ),
        429 => ApiError::new(
            ApiErrorKind::RateLimited,
            "Stability AI API rate limit exceeded. Please try again later.",
        ),
        400 => ApiError::new(
            ApiErrorKind::MalformedRequest,
            payload_message(payload).map_or_else(
                || "Invalid request to Stability AI API. Please check your prompt and options.".to_owned(),
                |message| format!("Stability AI API error: {message}"),
            ),
        ),
        other => ApiError::new(
            ApiErrorKind::Backend,
            format!("Stability AI API request failed with status {other}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use pictura_core::RecordStore;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;
    use crate::provider::test_support::{PNG, Stores, stores, stores_rejecting_updates};

    const KEY: &str = "sk-stability-0123456789abcdefghijklmnop";
    const ENDPOINT: &str = "/generation/stable-diffusion-xl-1024-v1-0/text-to-image";

    fn provider_with(stores: &Stores, server: &MockServer, configure: impl FnOnce(&mut ProviderConfig)) -> StabilityProvider {
        let mut config = ProviderConfig::new(DRIVER);
        config.api_key = Some(KEY.into());
        config.api_url = Some(server.uri());
        configure(&mut config);

        StabilityProvider::new("stability", config, stores.context.clone()).unwrap()
    }

    fn options(value: Value) -> Options {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn artifact_body() -> Value {
        json!({
            "artifacts": [{
                "base64": STANDARD.encode(PNG),
                "seed": 1234,
                "finishReason": "SUCCESS"
            }]
        })
    }

    #[tokio::test]
    async fn generate_archives_the_inline_image() {
        let server = MockServer::start().await;
        let stores = stores(|config| config.storage.auto_download = false);

        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(header("authorization", format!("Bearer {KEY}").as_str()))
            .and(header("accept", "application/json"))
            .and(body_json(json!({
                "text_prompts": [{ "text": "a lighthouse", "weight": 1.0 }],
                "cfg_scale": 7.0,
                "height": 1024,
                "width": 1024,
                "samples": 1,
                "steps": 30
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(artifact_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_with(&stores, &server, |_| {});
        let record = provider.generate("a lighthouse", Options::new()).await.unwrap();

        assert!(record.is_successful());
        assert_eq!(record.model.as_deref(), Some("stable-diffusion-xl-1024-v1-0"));
        assert_eq!(record.metadata["seed"], 1234);
        assert_eq!(record.metadata["finish_reason"], "SUCCESS");

        let file_path = record.file_path().unwrap();
        assert!(record.file_name().unwrap().starts_with(&format!("stability_{}_", record.id())));
        assert_eq!(record.mime_type(), Some("image/png"));
        assert!(stores.blobs.contains(file_path));
        assert_eq!(record.original_url(), Some(format!("memory://{file_path}").as_str()));

        let stored = stores.records.find(record.id()).await.unwrap().unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn unsaved_generation_does_not_keep_its_image() {
        let server = MockServer::start().await;
        let stores = stores_rejecting_updates(|_| {});

        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(artifact_body()))
            .mount(&server)
            .await;

        let provider = provider_with(&stores, &server, |_| {});
        let err = provider.generate("a lighthouse", Options::new()).await.unwrap_err();

        assert!(matches!(err, ImageGenError::Storage(ref message) if message.contains("disk full")));
        assert!(stores.blobs.is_empty());
    }

    #[tokio::test]
    async fn optional_fields_are_sent_only_when_supplied() {
        let server = MockServer::start().await;
        let stores = stores(|_| {});

        Mock::given(method("POST"))
            .and(path("/generation/stable-diffusion-v1-6/text-to-image"))
            .and(body_json(json!({
                "text_prompts": [
                    { "text": "a lighthouse", "weight": 1.0 },
                    { "text": "blurry", "weight": -1.0 }
                ],
                "cfg_scale": 9.5,
                "height": 1216,
                "width": 832,
                "samples": 1,
                "steps": 40,
                "seed": 42,
                "style_preset": "photographic"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(artifact_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_with(&stores, &server, |_| {});
        let record = provider
            .generate(
                "a lighthouse",
                options(json!({
                    "model": "stable-diffusion-v1-6",
                    "size": "832x1216",
                    "negative_prompt": "blurry",
                    "cfg_scale": 9.5,
                    "steps": 40,
                    "seed": "42",
                    "style_preset": "photographic"
                })),
            )
            .await
            .unwrap();

        assert_eq!((record.width, record.height), (Some(832), Some(1216)));
    }

    #[tokio::test]
    async fn explicit_dimensions_apply_without_a_size() {
        let server = MockServer::start().await;
        let stores = stores(|_| {});
        let provider = provider_with(&stores, &server, |config| {
            config.engine = Some("stable-diffusion-512-v2-1".to_owned());
        });

        let record = provider
            .generate_async("a lighthouse", options(json!({ "width": 512, "height": 768 })))
            .await
            .unwrap();

        assert!(record.is_pending());
        assert_eq!(record.model.as_deref(), Some("stable-diffusion-512-v2-1"));
        assert_eq!((record.width, record.height), (Some(512), Some(768)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_artifact_fails_the_record() {
        let server = MockServer::start().await;
        let stores = stores(|_| {});

        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "artifacts": [] })))
            .mount(&server)
            .await;

        let provider = provider_with(&stores, &server, |_| {});
        let Err(ImageGenError::Api(api)) = provider.generate("a lighthouse", Options::new()).await else {
            panic!("expected an API error");
        };

        assert_eq!(api.kind, ApiErrorKind::Backend);
        assert_eq!(api.message, "No image data received from Stability AI");

        let records = stores.records.latest(1).await.unwrap();
        assert!(records[0].is_failed());
        assert_eq!(records[0].error_message(), Some("No image data received from Stability AI"));
        assert!(stores.blobs.is_empty());
    }

    #[tokio::test]
    async fn status_codes_map_to_kinds() {
        let cases = [
            (401, json!({ "name": "unauthorized", "message": "missing key" }), ApiErrorKind::Unauthorized),
            (402, json!({ "message": "no credits" }), ApiErrorKind::InsufficientFunds),
            (429, json!({}), ApiErrorKind::RateLimited),
            (400, json!({ "name": "invalid_prompts", "message": "prompt rejected" }), ApiErrorKind::MalformedRequest),
            (503, json!({}), ApiErrorKind::Backend),
        ];

        for (status, body, kind) in cases {
            let server = MockServer::start().await;
            let stores = stores(|_| {});

            Mock::given(method("POST"))
                .and(path(ENDPOINT))
                .respond_with(ResponseTemplate::new(status).set_body_json(body))
                .mount(&server)
                .await;

            let provider = provider_with(&stores, &server, |_| {});
            let Err(ImageGenError::Api(api)) = provider.generate("a lighthouse", Options::new()).await else {
                panic!("status {status} should fail with an API error");
            };

            assert_eq!(api.kind, kind, "status {status}");
            assert_eq!(api.status, Some(status));
            assert!(api.payload.is_some());
            if status == 400 {
                assert_eq!(api.message, "Stability AI API error: prompt rejected");
            }
        }
    }

    #[tokio::test]
    async fn malformed_sizes_are_rejected_before_recording() {
        let server = MockServer::start().await;
        let stores = stores(|_| {});
        let provider = provider_with(&stores, &server, |_| {});

        for bad in [json!({ "size": "1024" }), json!({ "width": 0 })] {
            assert!(matches!(
                provider.generate("a lighthouse", options(bad)).await,
                Err(ImageGenError::InvalidOptions(_))
            ));
        }

        let long = "b".repeat(MAX_PROMPT_LENGTH + 1);
        assert!(matches!(
            provider.generate(&long, Options::new()).await,
            Err(ImageGenError::InvalidPrompt(_))
        ));

        assert!(stores.records.is_empty().await);
    }

    #[test]
    fn availability_follows_the_key_heuristic() {
        let stores = stores(|_| {});
        let with_key = |key: Option<&str>| {
            let mut config = ProviderConfig::new(DRIVER);
            config.api_key = key.map(Into::into);
            StabilityProvider::new("stability", config, stores.context.clone()).unwrap()
        };

        assert!(with_key(Some(KEY)).is_available());
        assert!(with_key(Some("sk-0123456789abcdefghijklmnopqrs")).is_available());
        assert!(!with_key(Some("sk-0123456789abcdefghijklmnopqr")).is_available());
        assert!(!with_key(Some("sk-fake")).is_available());
        assert!(!with_key(None).is_available());
    }

    #[test]
    fn descriptors_match_the_engine_tables() {
        let stores = stores(|_| {});
        let provider = StabilityProvider::new("sd", ProviderConfig::new(DRIVER), stores.context.clone()).unwrap();

        assert_eq!(provider.driver(), "stability");
        assert_eq!(provider.max_prompt_length(), 2000);
        assert_eq!(provider.supported_models()[0], "stable-diffusion-xl-1024-v1-0");

        let groups: Vec<_> = provider.supported_sizes().iter().map(|(group, _)| *group).collect();
        assert_eq!(groups, ["square", "portrait", "landscape"]);
        assert_eq!(provider.supported_sizes()[1].1, ["768x1344", "768x1152", "832x1216"]);
    }
}

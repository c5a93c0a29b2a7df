use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use jiff::Timestamp;
use pictura_core::{Artifact, BlobStore, StoreError};
use reqwest::Client;
use uuid::Uuid;

const FALLBACK_MIME: &str = "image/png";
const FALLBACK_EXTENSION: &str = "png";

/// Writes generated images into the blob store
#[derive(Clone)]
pub(crate) struct Archiver {
    blobs: Arc<dyn BlobStore>,
    directory: String,
}

impl Archiver {
    pub fn new(blobs: Arc<dyn BlobStore>, directory: &str) -> Self {
        Self {
            blobs,
            directory: directory.trim_matches('/').to_owned(),
        }
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Store image bytes as `{directory}/{prefix}{id}_{unix seconds}.{ext}`
    pub async fn archive(&self, id: Uuid, prefix: &str, bytes: &[u8]) -> Result<Artifact, StoreError> {
        let (mime_type, extension) = infer::get(bytes)
            .map_or((FALLBACK_MIME, FALLBACK_EXTENSION), |kind| (kind.mime_type(), kind.extension()));

        let name = format!("{prefix}{id}_{}.{extension}", Timestamp::now().as_second());
        let path = if self.directory.is_empty() {
            name.clone()
        } else {
            format!("{}/{name}", self.directory)
        };

        self.blobs.put(&path, bytes).await?;

        tracing::debug!(generation_id = %id, path = %path, size = bytes.len(), "archived generated image");

        Ok(Artifact {
            path,
            name,
            size: bytes.len() as u64,
            mime_type: mime_type.to_owned(),
        })
    }
}

/// Fetch a backend-hosted image
pub(crate) async fn download(client: &Client, url: &str) -> Result<Vec<u8>, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("failed to download image: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("image download returned {status}"));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("failed to read image body: {e}"))?;

    if bytes.is_empty() {
        return Err("image download returned an empty body".to_owned());
    }

    Ok(bytes.to_vec())
}

/// Decode an inline base64 image, tolerating a `data:` URL prefix
pub(crate) fn decode_base64(data: &str) -> Result<Vec<u8>, String> {
    let encoded = data
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(',').map(|(_, payload)| payload))
        .unwrap_or(data);

    STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("invalid base64 image payload: {e}"))
}

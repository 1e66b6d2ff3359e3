//! Encoder service backend for models the bundled runtime cannot host
//!
//! Protocol:
//! - `POST {endpoint}/encode/text`  `{"model": id, "inputs": ["..."]}`
//! - `POST {endpoint}/encode/image` `{"model": id, "images": ["<base64 png>"]}`
//!
//! Both answer `{"embeddings": [[f32, ...], ...]}` in input order.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::catalog::ModelInfo;
use super::provider::{
    check_dimensions, l2_normalize, Device, Embedding, EmbeddingError, EmbeddingProvider,
    EmbeddingResult,
};
use crate::images;

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    model: &'a str,
    inputs: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EncodeResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct RemoteEncoderProvider {
    client: reqwest::Client,
    endpoint: String,
    model_name: String,
    dimensions: usize,
    device: Device,
}

impl RemoteEncoderProvider {
    pub fn new(model: &ModelInfo, endpoint: &str, device: Device) -> EmbeddingResult<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&endpoint).map_err(|e| {
            EmbeddingError::InitFailed(format!("invalid encoder endpoint {endpoint:?}: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EmbeddingError::InitFailed(format!(
                "encoder endpoint must be http(s), got {endpoint:?}"
            )));
        }

        let client = reqwest::Client::builder().build().map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to build HTTP client: {}", e))
        })?;

        log::info!("Using remote encoder for {} at {}", model.id, endpoint);

        Ok(Self {
            client,
            endpoint,
            model_name: model.id.to_string(),
            dimensions: model.dimensions,
            device,
        })
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        expected: usize,
    ) -> EmbeddingResult<Vec<Embedding>> {
        let url = format!("{}{}", self.endpoint, path);
        log::debug!("POST {url}");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "encoder returned {status}: {body}"
            )));
        }

        let text = response.text().await?;
        let parsed: EncodeResponse = serde_json::from_str(&text).map_err(|err| {
            log::error!("{err}. tried to parse: {text:?}");
            EmbeddingError::EmbeddingFailed(format!("malformed encoder response: {err}"))
        })?;

        if parsed.embeddings.len() != expected {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "expected {expected} embeddings, got {}",
                parsed.embeddings.len()
            )));
        }

        parsed
            .embeddings
            .into_iter()
            .map(|embedding| {
                check_dimensions(self.dimensions, &embedding)?;
                Ok(l2_normalize(embedding))
            })
            .collect()
    }
}

fn encode_upload(image: &[u8]) -> EmbeddingResult<String> {
    let prepared = images::prepare_for_encoding(image)
        .map_err(|e| EmbeddingError::InvalidImage(format!("{e:#}")))?;
    log::debug!(
        "uploading {}x{} image ({})",
        prepared.dimensions.0,
        prepared.dimensions.1,
        prepared.detected_mime.unwrap_or("unknown")
    );
    Ok(STANDARD.encode(prepared.data))
}

#[async_trait]
impl EmbeddingProvider for RemoteEncoderProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn device(&self) -> Device {
        self.device
    }

    async fn encode_text(&self, text: &str) -> EmbeddingResult<Embedding> {
        let body = TextRequest {
            model: &self.model_name,
            inputs: vec![text],
        };
        self.request("/encode/text", &body, 1)
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    async fn encode_image(&self, image: &[u8]) -> EmbeddingResult<Embedding> {
        let body = ImageRequest {
            model: &self.model_name,
            images: vec![encode_upload(image)?],
        };
        self.request("/encode/image", &body, 1)
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    async fn encode_image_group(&self, images: &[Vec<u8>]) -> EmbeddingResult<Vec<Embedding>> {
        let encoded = images
            .iter()
            .map(|image| encode_upload(image))
            .collect::<EmbeddingResult<Vec<_>>>()?;
        let body = ImageRequest {
            model: &self.model_name,
            images: encoded,
        };
        self.request("/encode/image", &body, images.len()).await
    }
}

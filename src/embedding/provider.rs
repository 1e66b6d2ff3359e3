use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

/// Images per group when encoding a batch
pub const DEFAULT_BATCH_SIZE: usize = 8;

pub type Embedding = Vec<f32>;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Failed to process image: {0}")]
    InvalidImage(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding dimension mismatch: model is configured for {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Encoder request failed: {0}")]
    Network(#[from] reqwest::Error),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Compute device requested for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Auto,
    Cpu,
    Cuda,
    Mps,
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            "mps" => Ok(Device::Mps),
            other => anyhow::bail!("unknown device {other:?}, expected auto, cpu, cuda or mps"),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
            Device::Mps => "mps",
        };
        f.write_str(name)
    }
}

/// Text and image encoder producing unit-length vectors in a shared space.
///
/// Implementations must be safe to call concurrently. Failures are
/// deterministic for a given input, callers do not retry.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Catalog id of the loaded model
    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn device(&self) -> Device;

    async fn encode_text(&self, text: &str) -> EmbeddingResult<Embedding>;

    async fn encode_image(&self, image: &[u8]) -> EmbeddingResult<Embedding>;

    /// Encode one group of images. The default encodes them one by one.
    async fn encode_image_group(&self, images: &[Vec<u8>]) -> EmbeddingResult<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(images.len());
        for image in images {
            embeddings.push(self.encode_image(image).await?);
        }
        Ok(embeddings)
    }

    /// Encode many images, strictly sequentially, `batch_size` at a time.
    async fn encode_images_batch(
        &self,
        images: &[Vec<u8>],
        batch_size: usize,
    ) -> EmbeddingResult<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(images.len());
        for group in images.chunks(batch_size.max(1)) {
            embeddings.extend(self.encode_image_group(group).await?);
        }
        Ok(embeddings)
    }
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(mut vector: Embedding) -> Embedding {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

/// Reject vectors that do not match the configured dimensionality.
pub fn check_dimensions(expected: usize, vector: &[f32]) -> EmbeddingResult<()> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

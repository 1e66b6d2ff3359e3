//! CLIP ViT-B/32 executed in-process with fastembed.
//!
//! The text and vision towers are separate ONNX sessions. Both need
//! `&mut self` to run, so each sits behind a Mutex and every call is moved
//! to the blocking pool.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions, TextEmbedding};

use super::catalog::ModelInfo;
use super::provider::{
    check_dimensions, l2_normalize, Device, Embedding, EmbeddingError, EmbeddingProvider,
    EmbeddingResult,
};
use crate::images;

pub struct LocalClipProvider {
    text: Arc<Mutex<TextEmbedding>>,
    vision: Arc<Mutex<ImageEmbedding>>,
    model_name: String,
    dimensions: usize,
    device: Device,
}

impl LocalClipProvider {
    /// Load both towers, downloading them into `cache_dir` on first use.
    ///
    /// The text tower is probed once and its output length compared with the
    /// catalog; a mismatch is a configuration error.
    pub fn new(model: &ModelInfo, cache_dir: PathBuf, device: Device) -> EmbeddingResult<Self> {
        let device = match device {
            Device::Auto | Device::Cpu => Device::Cpu,
            requested => {
                log::warn!("device {requested} requested but the bundled runtime executes on cpu");
                Device::Cpu
            }
        };

        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!("Loading model: {} into {}", model.id, cache_dir.display());

        let text_options = InitOptions::new(fastembed::EmbeddingModel::ClipVitB32)
            .with_cache_dir(cache_dir.clone())
            .with_show_download_progress(true);
        let mut text = TextEmbedding::try_new(text_options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let vision_options = ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(true);
        let vision = ImageEmbedding::try_new(vision_options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut text)?;
        if dimensions != model.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: model.dimensions,
                actual: dimensions,
            });
        }

        log::info!("Model loaded! Embedding dimension: {}", dimensions);

        Ok(Self {
            text: Arc::new(Mutex::new(text)),
            vision: Arc::new(Mutex::new(vision)),
            model_name: model.id.to_string(),
            dimensions,
            device,
        })
    }

    fn probe_dimensions(model: &mut TextEmbedding) -> EmbeddingResult<usize> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }

    fn finish(&self, embedding: Embedding) -> EmbeddingResult<Embedding> {
        check_dimensions(self.dimensions, &embedding)?;
        Ok(l2_normalize(embedding))
    }

    async fn embed_prepared(&self, prepared: Vec<Vec<u8>>) -> EmbeddingResult<Vec<Embedding>> {
        let vision = self.vision.clone();
        let expected = prepared.len();

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = vision.lock().map_err(|e| {
                EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
            })?;
            let inputs: Vec<&[u8]> = prepared.iter().map(|data| data.as_slice()).collect();
            model
                .embed_bytes(&inputs, None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::EmbeddingFailed(format!("encode task failed: {}", e)))??;

        if embeddings.len() != expected {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "expected {expected} embeddings, got {}",
                embeddings.len()
            )));
        }

        embeddings.into_iter().map(|e| self.finish(e)).collect()
    }
}

fn prepare(image: &[u8]) -> EmbeddingResult<Vec<u8>> {
    let prepared = images::prepare_for_encoding(image)
        .map_err(|e| EmbeddingError::InvalidImage(format!("{e:#}")))?;
    log::debug!(
        "prepared {}x{} image ({})",
        prepared.dimensions.0,
        prepared.dimensions.1,
        prepared.detected_mime.unwrap_or("unknown")
    );
    Ok(prepared.data)
}

#[async_trait]
impl EmbeddingProvider for LocalClipProvider {
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
        let model = self.text.clone();
        let text = text.to_string();

        let embedding = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|e| {
                EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
            })?;

            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::EmbeddingFailed(format!("encode task failed: {}", e)))??;

        self.finish(embedding)
    }

    async fn encode_image(&self, image: &[u8]) -> EmbeddingResult<Embedding> {
        let prepared = prepare(image)?;
        self.embed_prepared(vec![prepared])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    async fn encode_image_group(&self, images: &[Vec<u8>]) -> EmbeddingResult<Vec<Embedding>> {
        let prepared = images
            .iter()
            .map(|image| prepare(image))
            .collect::<EmbeddingResult<Vec<_>>>()?;
        self.embed_prepared(prepared).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::find_model;

    // Require model download - run with --ignored
    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires model download"]
    async fn test_text_and_image_share_space() {
        let temp_dir = std::env::temp_dir().join("saga-search-clip-test");
        let model = find_model("clip-ViT-B-32").unwrap();
        let provider = LocalClipProvider::new(model, temp_dir, Device::Auto).unwrap();

        assert_eq!(provider.dimensions(), 512);
        assert_eq!(provider.device(), Device::Cpu);

        let text = provider.encode_text("a red square").await.unwrap();
        let norm: f32 = text.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);

        let png = crate::images::tests::create_test_png();
        let image = provider.encode_image(&png).await.unwrap();
        assert_eq!(image.len(), 512);

        let batch = provider
            .encode_images_batch(&[png.clone(), png.clone(), png], 2)
            .await
            .unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_prepare_reports_invalid_image() {
        assert!(matches!(
            prepare(b"not an image"),
            Err(EmbeddingError::InvalidImage(_))
        ));
    }
}

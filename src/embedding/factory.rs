use std::path::PathBuf;
use std::sync::Arc;

use super::catalog::{find_model, ModelFamily};
use super::local::LocalClipProvider;
use super::provider::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use super::remote::RemoteEncoderProvider;
use crate::config::EmbeddingConfig;

/// Create the embedding provider for the configured model.
///
/// A configured encoder endpoint takes precedence for every model. Without
/// one, only models of the `LocalClip` family can be served.
pub fn create_provider(config: &EmbeddingConfig) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    let model = find_model(&config.model).ok_or_else(|| {
        EmbeddingError::InvalidModel(format!("Unknown model: {}", config.model))
    })?;
    let device = config
        .device()
        .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

    log::info!("Loading CLIP model: {} on device: {}", model.id, device);

    if let Some(endpoint) = config.endpoint.as_deref() {
        return Ok(Arc::new(RemoteEncoderProvider::new(model, endpoint, device)?));
    }

    match model.family {
        ModelFamily::LocalClip => Ok(Arc::new(LocalClipProvider::new(
            model,
            PathBuf::from(&config.cache_dir),
            device,
        )?)),
        ModelFamily::RemoteEncoder => Err(EmbeddingError::InitFailed(format!(
            "model {} needs an encoder service: set EMBEDDING_ENDPOINT",
            model.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model() {
        let config = EmbeddingConfig {
            model: "nonexistent-model".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_provider(&config),
            Err(EmbeddingError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_remote_family_without_endpoint() {
        let config = EmbeddingConfig {
            model: "xlm-roberta-large-ViT-H-14".to_string(),
            endpoint: None,
            ..Default::default()
        };
        match create_provider(&config) {
            Err(EmbeddingError::InitFailed(message)) => {
                assert!(message.contains("EMBEDDING_ENDPOINT"))
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.model_name().to_string())),
        }
    }

    #[test]
    fn test_endpoint_selects_remote_provider() {
        let config = EmbeddingConfig {
            model: "clip-ViT-B-32-multilingual-v1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "clip-ViT-B-32-multilingual-v1");
        assert_eq!(provider.dimensions(), 512);
    }
}

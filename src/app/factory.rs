use std::sync::Arc;

use anyhow::Result;

use crate::{
    app::service::SearchService,
    backend::{EnvBackendSource, LazyBackend},
    config::Config,
    embedding::{create_provider, EmbeddingError, EmbeddingProvider},
    translation::GoogleTranslator,
};

/// Builds the application components from configuration.
pub struct AppFactory;

impl AppFactory {
    /// Create the search service.
    ///
    /// A provider that cannot start (missing encoder endpoint, model download
    /// failure) leaves the service degraded: health reports it and searches
    /// answer "not ready". A misconfigured model is fatal.
    pub fn create_search_service(config: &Config) -> Result<SearchService> {
        let embedder = Self::create_embedder(config)?;

        let backend = LazyBackend::new(EnvBackendSource::new(config.backend.clone()));
        if backend.get().is_err() {
            log::warn!("Starting without a search backend, will retry on each request");
        }

        let service = SearchService::new(embedder, &config.embedding.model, backend)
            .with_source_language(&config.translation.source_language);

        match config.translation.api_key.as_deref() {
            Some(api_key) => {
                log::info!("Query translation enabled");
                Ok(service.with_translator(Arc::new(GoogleTranslator::new(api_key)?)))
            }
            None => {
                log::info!("Query translation disabled: GOOGLE_TRANSLATE_API_KEY is not set");
                Ok(service)
            }
        }
    }

    /// Load the configured provider. Fatal errors are returned, recoverable
    /// ones become the `Err` reason stored in the service.
    pub fn create_embedder(
        config: &Config,
    ) -> Result<std::result::Result<Arc<dyn EmbeddingProvider>, String>> {
        match create_provider(&config.embedding) {
            Ok(provider) => {
                log::info!(
                    "Model loaded: {} ({} dimensions, {})",
                    provider.model_name(),
                    provider.dimensions(),
                    provider.device()
                );
                Ok(Ok(provider))
            }
            Err(
                err @ (EmbeddingError::InvalidModel(_) | EmbeddingError::DimensionMismatch { .. }),
            ) => Err(err.into()),
            Err(err) => {
                log::error!("Failed to load embedding model: {err}");
                Ok(Err(err.to_string()))
            }
        }
    }
}

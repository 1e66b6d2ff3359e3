use std::sync::Arc;

use crate::{
    backend::{
        not_ready_message, EmbeddingSearch, HybridWeights, LazyBackend, SimilarityBackend,
        TextSearch,
    },
    embedding::{EmbeddingProvider, CATALOG},
    search::{
        normalize_image_query, normalize_text_query, rank_by_relevance,
        reconcile::{attach_urls, item_from_row},
        reconcile_rows, HealthResponse, ImageSearchResponse, ModelsResponse, ScoreColumn,
        SearchParams, TextQuery, TextSearchResponse,
    },
    config::DEFAULT_SOURCE_LANGUAGE,
    translation::Translator,
};

use super::errors::AppError;

/// The query surface: every operation validates its input, makes sure the
/// components it needs are initialized, then embeds, searches and
/// reconciles.
pub struct SearchService {
    /// Loaded provider, or the reason it could not be loaded
    embedder: Result<Arc<dyn EmbeddingProvider>, String>,
    model_name: String,
    backend: LazyBackend,
    translator: Option<Arc<dyn Translator>>,
    /// Used when a request does not name its own source language
    source_language: String,
}

impl SearchService {
    pub fn new(
        embedder: Result<Arc<dyn EmbeddingProvider>, String>,
        model_name: &str,
        backend: LazyBackend,
    ) -> Self {
        Self {
            embedder,
            model_name: model_name.to_string(),
            backend,
            translator: None,
            source_language: DEFAULT_SOURCE_LANGUAGE.to_string(),
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_source_language(mut self, source_language: &str) -> Self {
        self.source_language = source_language.to_string();
        self
    }

    pub fn backend(&self) -> &LazyBackend {
        &self.backend
    }

    fn embedder(&self) -> Result<&Arc<dyn EmbeddingProvider>, AppError> {
        self.embedder
            .as_ref()
            .map_err(|reason| AppError::NotReady(format!("Embedding model not loaded: {reason}")))
    }

    fn similarity_backend(&self) -> Result<Arc<dyn SimilarityBackend>, AppError> {
        self.backend
            .get()
            .map_err(|err| AppError::NotReady(not_ready_message(&err)))
    }

    /// Returns the text to embed, and the translation when it differs.
    async fn maybe_translate(&self, query: &TextQuery) -> (String, Option<String>) {
        let translator = match &self.translator {
            Some(translator) if query.translate && translator.is_available() => translator,
            _ => return (query.text.clone(), None),
        };

        let source = query
            .source_language
            .as_deref()
            .unwrap_or(self.source_language.as_str());
        let translated = translator.translate(&query.text, source).await;
        if translated != query.text {
            log::info!("Translated query {:?} -> {:?}", query.text, translated);
            (translated.clone(), Some(translated))
        } else {
            (translated, None)
        }
    }

    /// Vector search by text.
    pub async fn search_text(&self, params: &SearchParams) -> Result<TextSearchResponse, AppError> {
        let query = normalize_text_query(params)?;
        let embedder = self.embedder()?;
        let backend = self.similarity_backend()?;

        let (text, translated_query) = self.maybe_translate(&query).await;
        let embedding = embedder.encode_text(&text).await?;

        let search = EmbeddingSearch::new(embedding, &query.filters);
        let rows = backend.search_by_embedding(&search).await?;
        let results = reconcile_rows(
            &rows,
            ScoreColumn::Similarity,
            backend.as_ref(),
            query.filters.limit as usize,
        );
        log::info!("Text search {:?} returned {} results", query.text, results.len());

        let mut response = TextSearchResponse::new(query.text, query.filters.search_type, results);
        response.translated_query = translated_query;
        Ok(response)
    }

    /// Vector search by an uploaded image.
    pub async fn search_image(
        &self,
        params: &SearchParams,
        content_type: Option<&str>,
        image: Vec<u8>,
    ) -> Result<ImageSearchResponse, AppError> {
        let query = normalize_image_query(params, content_type, image)?;
        let embedder = self.embedder()?;
        let backend = self.similarity_backend()?;

        let embedding = embedder.encode_image(&query.image).await?;

        let search = EmbeddingSearch::new(embedding, &query.filters);
        let rows = backend.search_by_embedding(&search).await?;
        let results = reconcile_rows(
            &rows,
            ScoreColumn::Similarity,
            backend.as_ref(),
            query.filters.limit as usize,
        );
        log::info!(
            "Image search ({}, {} bytes) returned {} results",
            query.content_type,
            query.image.len(),
            results.len()
        );

        Ok(ImageSearchResponse::new(query.filters.search_type, results))
    }

    /// Vector search blended with the backend's own full-text rank.
    pub async fn search_hybrid(
        &self,
        params: &SearchParams,
    ) -> Result<TextSearchResponse, AppError> {
        let query = normalize_text_query(params)?;
        let embedder = self.embedder()?;
        let backend = self.similarity_backend()?;

        let (text, translated_query) = self.maybe_translate(&query).await;
        let embedding = embedder.encode_text(&text).await?;

        let search = EmbeddingSearch::new(embedding, &query.filters);
        let rows = backend
            .hybrid_search(&search, &text, HybridWeights::default())
            .await?;
        let results = reconcile_rows(
            &rows,
            ScoreColumn::Combined,
            backend.as_ref(),
            query.filters.limit as usize,
        );
        log::info!("Hybrid search {:?} returned {} results", query.text, results.len());

        let mut response = TextSearchResponse::new(query.text, query.filters.search_type, results);
        response.translated_query = translated_query;
        Ok(response)
    }

    /// Keyword search ranked by local text relevance. Needs no embedding
    /// model.
    pub async fn search_full_text(
        &self,
        params: &SearchParams,
    ) -> Result<TextSearchResponse, AppError> {
        let query = normalize_text_query(params)?;
        let backend = self.similarity_backend()?;

        let (text, translated_query) = self.maybe_translate(&query).await;

        let rows = backend
            .text_search(&TextSearch::new(&text, &query.filters))
            .await?;
        let candidates = rows
            .iter()
            .map(|row| item_from_row(row, ScoreColumn::Similarity))
            .collect();

        let mut results = rank_by_relevance(
            &text,
            candidates,
            query.filters.threshold,
            query.filters.limit as usize,
        );
        for item in results.iter_mut() {
            attach_urls(item, backend.as_ref());
        }
        log::info!("Full-text search {:?} returned {} results", query.text, results.len());

        let mut response = TextSearchResponse::new(query.text, query.filters.search_type, results);
        response.translated_query = translated_query;
        Ok(response)
    }

    /// Component status. Retries backend initialization when needed.
    pub fn health(&self) -> HealthResponse {
        let backend = self.backend.status();
        let model_loaded = self.embedder.is_ok();

        let status = if model_loaded && backend.connected {
            "healthy"
        } else {
            "degraded"
        };

        HealthResponse {
            status: status.to_string(),
            model_loaded,
            model_name: self.model_name.clone(),
            backend_connected: backend.connected,
            backend_url_configured: backend.url_configured,
            backend_key_configured: backend.key_configured,
        }
    }

    pub fn models(&self) -> ModelsResponse {
        let embedder = self.embedder.as_ref().ok();
        ModelsResponse {
            current_model: embedder.map(|e| e.model_name().to_string()),
            embedding_dimension: embedder.map(|e| e.dimensions()),
            device: embedder.map(|e| e.device().to_string()),
            available_models: &CATALOG,
        }
    }
}

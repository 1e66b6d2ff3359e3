
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::app::SearchService;
use crate::backend::{
    BackendError, BackendResult, BackendSource, EmbeddingSearch, HybridWeights, LazyBackend,
    RawRow, SimilarityBackend, TextSearch,
};
use crate::config::BackendSettings;
use crate::embedding::provider::{l2_normalize, EmbeddingResult};
use crate::embedding::{Device, Embedding, EmbeddingError, EmbeddingProvider};
use crate::translation::Translator;

pub const STUB_DIMENSIONS: usize = 4;

/// Deterministic provider that counts its calls.
#[derive(Default)]
pub struct StubProvider {
    pub text_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
    /// Texts passed to `encode_text`, in order
    pub texts: Mutex<Vec<String>>,
}

fn hash_vector(bytes: &[u8]) -> Embedding {
    let mut vector = vec![1.0f32; STUB_DIMENSIONS];
    for (i, byte) in bytes.iter().enumerate() {
        vector[i % STUB_DIMENSIONS] += *byte as f32;
    }
    l2_normalize(vector)
}

impl StubProvider {
    pub fn calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst) + self.image_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn model_name(&self) -> &str {
        "clip-ViT-B-32"
    }

    fn dimensions(&self) -> usize {
        STUB_DIMENSIONS
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    async fn encode_text(&self, text: &str) -> EmbeddingResult<Embedding> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        Ok(hash_vector(text.as_bytes()))
    }

    async fn encode_image(&self, image: &[u8]) -> EmbeddingResult<Embedding> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if image::load_from_memory(image).is_err() {
            return Err(EmbeddingError::InvalidImage("Failed to decode image".to_string()));
        }
        Ok(hash_vector(image))
    }
}

/// In-memory backend that records what it was asked.
#[derive(Default)]
pub struct StubBackend {
    pub rows: Mutex<Vec<RawRow>>,
    pub searches: Mutex<Vec<EmbeddingSearch>>,
    pub hybrid_texts: Mutex<Vec<String>>,
    pub text_searches: Mutex<Vec<TextSearch>>,
    /// Respond with a 500 to every search
    pub failing: bool,
}

impl StubBackend {
    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().map(into_row).collect()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    fn respond(&self, operation: &str) -> BackendResult<Vec<RawRow>> {
        if self.failing {
            return Err(BackendError::Status {
                operation: operation.to_string(),
                status: 500,
                body: "relation \"media_items\" does not exist".to_string(),
            });
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

pub fn into_row(value: Value) -> RawRow {
    match value {
        Value::Object(row) => row,
        other => panic!("row must be an object, got {other}"),
    }
}

#[async_trait]
impl SimilarityBackend for StubBackend {
    async fn search_by_embedding(&self, search: &EmbeddingSearch) -> BackendResult<Vec<RawRow>> {
        self.searches.lock().unwrap().push(search.clone());
        self.respond("search_media_by_embedding")
    }

    async fn hybrid_search(
        &self,
        search: &EmbeddingSearch,
        text: &str,
        _weights: HybridWeights,
    ) -> BackendResult<Vec<RawRow>> {
        self.searches.lock().unwrap().push(search.clone());
        self.hybrid_texts.lock().unwrap().push(text.to_string());
        self.respond("hybrid_search_media")
    }

    async fn text_search(&self, search: &TextSearch) -> BackendResult<Vec<RawRow>> {
        self.text_searches.lock().unwrap().push(search.clone());
        self.respond("media_items")
    }

    fn public_url(&self, path: &str) -> Option<String> {
        if path.is_empty() {
            return None;
        }
        Some(format!("https://cdn.test/media-files/{path}"))
    }

    async fn test_connection(&self) -> bool {
        !self.failing
    }
}

/// Hands out a shared [`StubBackend`] once a url and key are configured.
pub struct StubSource {
    pub settings: Arc<Mutex<BackendSettings>>,
    pub backend: Arc<StubBackend>,
}

impl BackendSource for StubSource {
    fn settings(&self) -> BackendSettings {
        self.settings.lock().unwrap().clone()
    }

    fn connect(&self, settings: &BackendSettings) -> BackendResult<Arc<dyn SimilarityBackend>> {
        if settings.url.is_none() {
            return Err(BackendError::NotConfigured("SUPABASE_URL is not set".to_string()));
        }
        if settings.key.is_none() {
            return Err(BackendError::NotConfigured("SUPABASE_KEY is not set".to_string()));
        }
        Ok(self.backend.clone())
    }
}

pub fn configured_settings() -> BackendSettings {
    BackendSettings {
        url: Some("https://x.supabase.co".to_string()),
        key: Some("service-key".to_string()),
        bucket: "media-files".to_string(),
    }
}

/// Translates a couple of Icelandic words.
/// Translates a fixed vocabulary and records the source language of each call.
#[derive(Default)]
pub struct StubTranslator {
    pub sources: Mutex<Vec<String>>,
}

#[async_trait]
impl Translator for StubTranslator {
    fn is_available(&self) -> bool {
        true
    }

    async fn translate(&self, text: &str, source: &str) -> String {
        self.sources.lock().unwrap().push(source.to_string());
        match text {
            "bátur" => "boat".to_string(),
            "höfn" => "harbour".to_string(),
            other => other.to_string(),
        }
    }
}

pub struct Harness {
    pub service: SearchService,
    pub provider: Arc<StubProvider>,
    pub backend: Arc<StubBackend>,
    pub settings: Arc<Mutex<BackendSettings>>,
}

impl Harness {
    /// Service with a loaded model and a configured backend.
    pub fn new(backend: StubBackend) -> Self {
        Self::build(backend, configured_settings())
    }

    /// Service whose backend settings start out empty.
    pub fn unconfigured() -> Self {
        Self::build(StubBackend::default(), BackendSettings::default())
    }

    fn build(backend: StubBackend, settings: BackendSettings) -> Self {
        let provider = Arc::new(StubProvider::default());
        let backend = Arc::new(backend);
        let settings = Arc::new(Mutex::new(settings));

        let lazy = LazyBackend::new(StubSource {
            settings: settings.clone(),
            backend: backend.clone(),
        });
        let service = SearchService::new(Ok(provider.clone()), "clip-ViT-B-32", lazy);

        Self {
            service,
            provider,
            backend,
            settings,
        }
    }
}

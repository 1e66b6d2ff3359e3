//! Similarity backend: vector search RPCs, full-text candidate fetch and
//! public asset urls.

mod lazy;
mod supabase;

use async_trait::async_trait;
use serde::Serialize;

use crate::search::{FileType, Filters, SearchType};

pub use lazy::{not_ready_message, BackendSource, BackendStatus, EnvBackendSource, LazyBackend};
pub use supabase::SupabaseBackend;

/// One result row exactly as the backend returned it.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("backend is not configured: {0}")]
    NotConfigured(String),

    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation} returned {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

/// Body of the vector search RPC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingSearch {
    pub query_embedding: Vec<f32>,
    pub search_type: SearchType,
    pub match_threshold: f64,
    pub match_count: u32,
    pub file_type_filter: Option<FileType>,
    pub decade_filter: Option<String>,
}

impl EmbeddingSearch {
    pub fn new(query_embedding: Vec<f32>, filters: &Filters) -> Self {
        Self {
            query_embedding,
            search_type: filters.search_type,
            match_threshold: filters.threshold,
            match_count: filters.limit,
            file_type_filter: filters.file_type,
            decade_filter: filters.decade.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HybridWeights {
    pub vector_weight: f64,
    pub text_weight: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            text_weight: 0.3,
        }
    }
}

/// Candidate fetch for the full-text fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSearch {
    pub text: String,
    pub file_type: Option<FileType>,
    pub decade: Option<String>,
    /// Number of candidate rows to fetch before local scoring
    pub candidates: u32,
}

/// Over-fetch factor for full-text candidates, since local scoring drops rows.
const CANDIDATE_FACTOR: u32 = 5;
const MAX_CANDIDATES: u32 = 500;

impl TextSearch {
    pub fn new(text: &str, filters: &Filters) -> Self {
        Self {
            text: text.to_string(),
            file_type: filters.file_type,
            decade: filters.decade.clone(),
            candidates: (filters.limit * CANDIDATE_FACTOR).min(MAX_CANDIDATES),
        }
    }
}

#[async_trait]
pub trait SimilarityBackend: Send + Sync {
    async fn search_by_embedding(&self, search: &EmbeddingSearch) -> BackendResult<Vec<RawRow>>;

    async fn hybrid_search(
        &self,
        search: &EmbeddingSearch,
        text: &str,
        weights: HybridWeights,
    ) -> BackendResult<Vec<RawRow>>;

    async fn text_search(&self, search: &TextSearch) -> BackendResult<Vec<RawRow>>;

    /// Public url of a stored object. `None` when it cannot be resolved.
    fn public_url(&self, path: &str) -> Option<String>;

    async fn test_connection(&self) -> bool;
}

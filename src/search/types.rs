use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::query::SearchType;

/// A stored media record as returned to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: String,
    pub filename: String,
    pub original_filename: Option<String>,
    pub file_type: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub storage_path: String,
    pub thumbnail_path: Option<String>,
    pub storage_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub decade: Option<String>,
    pub duration_seconds: Option<f64>,
    pub metadata: Option<Value>,
    /// Backend cosine similarity, or the local text-relevance score on
    /// the full-text path. The two are not comparable.
    pub similarity_score: f64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSearchResponse {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub translated_query: Option<String>,
    pub search_type: SearchType,
    pub results: Vec<SearchResultItem>,
    pub count: usize,
}

impl TextSearchResponse {
    pub fn new(query: String, search_type: SearchType, results: Vec<SearchResultItem>) -> Self {
        Self {
            query,
            translated_query: None,
            search_type,
            count: results.len(),
            results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSearchResponse {
    pub search_type: SearchType,
    pub results: Vec<SearchResultItem>,
    pub count: usize,
}

impl ImageSearchResponse {
    pub fn new(search_type: SearchType, results: Vec<SearchResultItem>) -> Self {
        Self {
            search_type,
            count: results.len(),
            results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_name: String,
    pub backend_connected: bool,
    pub backend_url_configured: bool,
    pub backend_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub current_model: Option<String>,
    pub embedding_dimension: Option<usize>,
    pub device: Option<String>,
    pub available_models: &'static [crate::embedding::ModelInfo],
}

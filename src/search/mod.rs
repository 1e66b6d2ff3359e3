//! Query normalization and result reconciliation.

pub mod query;
pub mod reconcile;
pub mod relevance;
pub mod types;

pub use query::{
    normalize_image_query, normalize_text_query, FileType, Filters, SearchParams, SearchType,
    TextQuery, ValidationError,
};
pub use reconcile::{reconcile_rows, ScoreColumn};
pub use relevance::rank_by_relevance;
pub use types::{HealthResponse, ImageSearchResponse, ModelsResponse, TextSearchResponse};

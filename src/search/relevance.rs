//! Heuristic text relevance for the full-text fallback path.
//!
//! Weights (case-insensitive):
//! - description equals the query: 0.5, starts or ends with it: 0.4,
//!   contains it: 0.3
//! - filename contains the query (original filename preferred): 0.25
//! - any tag contains the query: 0.25
//!
//! The total is capped at 1.0. These scores are not cosine similarities and
//! are never mixed with backend-ranked results.

use super::reconcile::sort_and_truncate;
use super::types::SearchResultItem;

const DESCRIPTION_EXACT: f64 = 0.5;
const DESCRIPTION_EDGE: f64 = 0.4;
const DESCRIPTION_SUBSTRING: f64 = 0.3;
const FILENAME_MATCH: f64 = 0.25;
const TAG_MATCH: f64 = 0.25;
const MAX_SCORE: f64 = 1.0;

fn description_score(query: &str, description: &str) -> f64 {
    let description = description.to_lowercase();
    if description == query {
        DESCRIPTION_EXACT
    } else if description.starts_with(query) || description.ends_with(query) {
        DESCRIPTION_EDGE
    } else if description.contains(query) {
        DESCRIPTION_SUBSTRING
    } else {
        0.0
    }
}

pub fn text_relevance(query: &str, item: &SearchResultItem) -> f64 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;

    if let Some(description) = item.description.as_deref() {
        score += description_score(&query, description);
    }

    let filename = item
        .original_filename
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&item.filename);
    if filename.to_lowercase().contains(&query) {
        score += FILENAME_MATCH;
    }

    let tag_match = item
        .tags
        .iter()
        .flatten()
        .any(|tag| tag.to_lowercase().contains(&query));
    if tag_match {
        score += TAG_MATCH;
    }

    f64::min(score, MAX_SCORE)
}

/// Score every item, drop non-matches and items below `threshold`, then
/// sort descending and keep `limit`.
pub fn rank_by_relevance(
    query: &str,
    items: Vec<SearchResultItem>,
    threshold: f64,
    limit: usize,
) -> Vec<SearchResultItem> {
    let mut ranked: Vec<_> = items
        .into_iter()
        .filter_map(|mut item| {
            let score = text_relevance(query, &item);
            if score <= 0.0 || score < threshold {
                return None;
            }
            item.similarity_score = score;
            Some(item)
        })
        .collect();

    sort_and_truncate(&mut ranked, limit);
    ranked
}

//! Raw backend rows to client results.

use serde_json::Value;

use super::types::SearchResultItem;
use crate::backend::{RawRow, SimilarityBackend};

/// Which column of a raw row carries the backend's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreColumn {
    /// `similarity`, from the vector search RPC
    Similarity,
    /// `combined_score` from the hybrid RPC, `similarity` when absent
    Combined,
}

fn string_or_empty(row: &RawRow, key: &str) -> String {
    optional_string(row, key).unwrap_or_default()
}

fn optional_string(row: &RawRow, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::Null => None,
        Value::String(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}

fn optional_f64(row: &RawRow, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

fn optional_i64(row: &RawRow, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|f| f as i64)),
        Value::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

fn optional_tags(row: &RawRow) -> Option<Vec<String>> {
    match row.get("tags")? {
        Value::Array(values) => Some(
            values
                .iter()
                .filter_map(|value| match value {
                    Value::Null => None,
                    Value::String(tag) => Some(tag.clone()),
                    other => Some(other.to_string()),
                })
                .collect(),
        ),
        _ => None,
    }
}

fn score(row: &RawRow, column: ScoreColumn) -> f64 {
    let value = match column {
        ScoreColumn::Similarity => optional_f64(row, "similarity"),
        ScoreColumn::Combined => {
            optional_f64(row, "combined_score").or_else(|| optional_f64(row, "similarity"))
        }
    };
    value.unwrap_or(0.0)
}

/// Project a row without resolving URLs.
pub fn item_from_row(row: &RawRow, column: ScoreColumn) -> SearchResultItem {
    SearchResultItem {
        id: optional_string(row, "id").unwrap_or_default(),
        filename: string_or_empty(row, "filename"),
        original_filename: optional_string(row, "original_filename"),
        file_type: string_or_empty(row, "file_type"),
        mime_type: optional_string(row, "mime_type"),
        file_size: optional_i64(row, "file_size"),
        storage_path: string_or_empty(row, "storage_path"),
        thumbnail_path: optional_string(row, "thumbnail_path"),
        storage_url: None,
        thumbnail_url: None,
        description: optional_string(row, "description"),
        tags: optional_tags(row),
        decade: optional_string(row, "decade"),
        duration_seconds: optional_f64(row, "duration_seconds"),
        metadata: row.get("metadata").filter(|value| !value.is_null()).cloned(),
        similarity_score: score(row, column),
        created_at: optional_string(row, "created_at"),
        updated_at: optional_string(row, "updated_at"),
    }
}

/// Fill in public URLs. A path that cannot be resolved leaves its URL empty.
pub fn attach_urls(item: &mut SearchResultItem, backend: &dyn SimilarityBackend) {
    item.storage_url = backend.public_url(&item.storage_path);
    item.thumbnail_url = item
        .thumbnail_path
        .as_deref()
        .and_then(|path| backend.public_url(path));
}

/// Sort by descending score (stable) and keep the first `limit`.
pub fn sort_and_truncate(items: &mut Vec<SearchResultItem>, limit: usize) {
    items.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    items.truncate(limit);
}

/// Map the rows of a vector search. Scores are copied from the backend.
pub fn reconcile_rows(
    rows: &[RawRow],
    column: ScoreColumn,
    backend: &dyn SimilarityBackend,
    limit: usize,
) -> Vec<SearchResultItem> {
    let mut items: Vec<_> = rows
        .iter()
        .map(|row| {
            let mut item = item_from_row(row, column);
            attach_urls(&mut item, backend);
            item
        })
        .collect();

    sort_and_truncate(&mut items, limit);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RawRow {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_full_row() {
        let row = row(json!({
            "id": "7d1f",
            "filename": "a.jpg",
            "original_filename": "Reykjavik 1955.jpg",
            "file_type": "image",
            "mime_type": "image/jpeg",
            "file_size": 12345,
            "storage_path": "2024/a.jpg",
            "thumbnail_path": "thumbs/a.jpg",
            "description": "Harbour",
            "tags": ["boat", "harbour"],
            "decade": "1950s",
            "duration_seconds": null,
            "metadata": {"camera": "Leica"},
            "similarity": 0.8123,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": null
        }));

        let item = item_from_row(&row, ScoreColumn::Similarity);
        assert_eq!(item.id, "7d1f");
        assert_eq!(item.original_filename.as_deref(), Some("Reykjavik 1955.jpg"));
        assert_eq!(item.file_size, Some(12345));
        assert_eq!(item.tags, Some(vec!["boat".to_string(), "harbour".to_string()]));
        assert_eq!(item.metadata, Some(json!({"camera": "Leica"})));
        assert_eq!(item.duration_seconds, None);
        assert_eq!(item.updated_at, None);
        assert_eq!(item.similarity_score, 0.8123);
    }

    #[test]
    fn test_missing_fields_default() {
        let item = item_from_row(&row(json!({})), ScoreColumn::Similarity);
        assert_eq!(item.id, "");
        assert_eq!(item.filename, "");
        assert_eq!(item.file_type, "");
        assert_eq!(item.storage_path, "");
        assert_eq!(item.thumbnail_path, None);
        assert_eq!(item.tags, None);
        assert_eq!(item.metadata, None);
        assert_eq!(item.similarity_score, 0.0);
    }

    #[test]
    fn test_numeric_id_and_string_score() {
        let item = item_from_row(
            &row(json!({"id": 42, "similarity": "0.5", "file_size": "10"})),
            ScoreColumn::Similarity,
        );
        assert_eq!(item.id, "42");
        assert_eq!(item.similarity_score, 0.5);
        assert_eq!(item.file_size, Some(10));
    }

    #[test]
    fn test_combined_score_column() {
        let both = row(json!({"similarity": 0.4, "combined_score": 0.9}));
        assert_eq!(item_from_row(&both, ScoreColumn::Combined).similarity_score, 0.9);
        assert_eq!(item_from_row(&both, ScoreColumn::Similarity).similarity_score, 0.4);

        let similarity_only = row(json!({"similarity": 0.4}));
        assert_eq!(
            item_from_row(&similarity_only, ScoreColumn::Combined).similarity_score,
            0.4
        );
    }

    #[test]
    fn test_sort_and_truncate_is_stable() {
        let mut items: Vec<_> = [("a", 0.2), ("b", 0.9), ("c", 0.2), ("d", 0.5)]
            .into_iter()
            .map(|(id, score)| SearchResultItem {
                id: id.to_string(),
                similarity_score: score,
                ..Default::default()
            })
            .collect();

        sort_and_truncate(&mut items, 3);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a"]);
    }
}

//! PostgREST / Supabase storage client.
//!
//! - `POST {url}/rest/v1/rpc/search_media_by_embedding`
//! - `POST {url}/rest/v1/rpc/hybrid_search_media`
//! - `GET  {url}/rest/v1/media_items?...` for full-text candidates
//! - `{url}/storage/v1/object/public/{bucket}/{path}` for asset urls

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use url::Url;

use super::{
    BackendError, BackendResult, EmbeddingSearch, HybridWeights, RawRow, SimilarityBackend,
    TextSearch,
};
use crate::config::BackendSettings;

const MEDIA_TABLE: &str = "media_items";
const SEARCH_RPC: &str = "search_media_by_embedding";
const HYBRID_RPC: &str = "hybrid_search_media";
const TEXT_COLUMNS: [&str; 4] = ["description", "filename", "original_filename", "tags_text"];

#[derive(Serialize)]
struct HybridBody<'a> {
    #[serde(flatten)]
    search: &'a EmbeddingSearch,
    query_text: &'a str,
    #[serde(flatten)]
    weights: HybridWeights,
}

pub struct SupabaseBackend {
    client: reqwest::Client,
    base_url: Url,
    bucket: String,
}

impl SupabaseBackend {
    pub fn new(settings: &BackendSettings) -> BackendResult<Self> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| BackendError::NotConfigured("SUPABASE_URL is not set".to_string()))?;
        let key = settings.key.as_deref().ok_or_else(|| {
            BackendError::NotConfigured("no SUPABASE_KEY (or service/anon key) is set".to_string())
        })?;

        let mut base_url = Url::parse(url.trim())?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BackendError::NotConfigured(format!(
                "SUPABASE_URL must be http(s), got {}",
                base_url.scheme()
            )));
        }
        // so that `join` keeps any path prefix
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let invalid_key = |_| {
            BackendError::NotConfigured("backend key is not a valid header value".to_string())
        };
        let mut headers = HeaderMap::new();
        let mut apikey = HeaderValue::from_str(key).map_err(invalid_key)?;
        apikey.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid_key)?;
        bearer.set_sensitive(true);
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url,
            bucket: settings.bucket.clone(),
        })
    }

    fn rest_url(&self, path: &str) -> BackendResult<Url> {
        Ok(self.base_url.join("rest/v1/")?.join(path)?)
    }

    async fn rows(
        &self,
        operation: &str,
        response: reqwest::Response,
    ) -> BackendResult<Vec<RawRow>> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let value: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
            log::error!("{err}. tried to parse: {text:?}");
            BackendError::Malformed(format!("{operation}: {err}"))
        })?;

        match value {
            serde_json::Value::Null => Ok(vec![]),
            serde_json::Value::Array(values) => values
                .into_iter()
                .map(|value| match value {
                    serde_json::Value::Object(row) => Ok(row),
                    other => Err(BackendError::Malformed(format!(
                        "{operation}: expected an object row, got {other}"
                    ))),
                })
                .collect(),
            other => Err(BackendError::Malformed(format!(
                "{operation}: expected an array of rows, got {other}"
            ))),
        }
    }

    async fn rpc<B: Serialize + ?Sized>(&self, name: &str, body: &B) -> BackendResult<Vec<RawRow>> {
        let url = self.rest_url(&format!("rpc/{name}"))?;
        log::debug!("POST {url}");
        let response = self.client.post(url).json(body).send().await?;
        self.rows(name, response).await
    }
}

/// Double-quote a value for a PostgREST logic tree, where `,` `.` `(` and `)`
/// are reserved.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Escape `LIKE` wildcards so user text only matches literally. `*` is
/// PostgREST's own wildcard and cannot be escaped.
fn like_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `or` filter matching the text as a case-insensitive substring of the
/// description, the filenames or any tag. Tags are matched through the
/// `tags_text` computed column, which joins the array into one string.
fn text_filter(text: &str) -> String {
    let pattern = quote(&format!("*{}*", like_escape(text)));
    let clauses: Vec<_> = TEXT_COLUMNS
        .iter()
        .map(|column| format!("{column}.ilike.{pattern}"))
        .collect();
    format!("({})", clauses.join(","))
}

fn text_search_query(search: &TextSearch) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", "*".to_string()),
        ("or", text_filter(search.text.trim())),
    ];
    if let Some(file_type) = search.file_type {
        query.push(("file_type", format!("eq.{}", file_type.as_str())));
    }
    if let Some(decade) = &search.decade {
        query.push(("decade", format!("eq.{decade}")));
    }
    query.push(("limit", search.candidates.to_string()));
    query
}

#[async_trait]
impl SimilarityBackend for SupabaseBackend {
    async fn search_by_embedding(&self, search: &EmbeddingSearch) -> BackendResult<Vec<RawRow>> {
        self.rpc(SEARCH_RPC, search).await
    }

    async fn hybrid_search(
        &self,
        search: &EmbeddingSearch,
        text: &str,
        weights: HybridWeights,
    ) -> BackendResult<Vec<RawRow>> {
        let body = HybridBody {
            search,
            query_text: text,
            weights,
        };
        self.rpc(HYBRID_RPC, &body).await
    }

    async fn text_search(&self, search: &TextSearch) -> BackendResult<Vec<RawRow>> {
        let url = self.rest_url(MEDIA_TABLE)?;
        log::debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .query(&text_search_query(search))
            .send()
            .await?;
        self.rows(MEDIA_TABLE, response).await
    }

    fn public_url(&self, path: &str) -> Option<String> {
        let path = path.trim().trim_start_matches('/');
        if path.is_empty() {
            return None;
        }

        let mut url = match self.base_url.join("storage/v1/object/public/") {
            Ok(url) => url,
            Err(err) => {
                log::warn!("cannot resolve public url for {path:?}: {err}");
                return None;
            }
        };

        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty().push(&self.bucket).extend(path.split('/'));
            }
            Err(()) => {
                log::warn!("cannot resolve public url for {path:?}: base url cannot hold a path");
                return None;
            }
        }

        Some(url.to_string())
    }

    async fn test_connection(&self) -> bool {
        let url = match self.rest_url(MEDIA_TABLE) {
            Ok(url) => url,
            Err(err) => {
                log::warn!("backend connection test failed: {err}");
                return false;
            }
        };

        let result = self
            .client
            .get(url)
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                log::warn!("backend connection test returned {}", response.status());
                false
            }
            Err(err) => {
                log::warn!("backend connection test failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::FileType;

    fn settings(url: &str) -> BackendSettings {
        BackendSettings {
            url: Some(url.to_string()),
            key: Some("service-key".to_string()),
            bucket: "media-files".to_string(),
        }
    }

    #[test]
    fn test_requires_url_and_key() {
        let mut missing_url = settings("https://x.supabase.co");
        missing_url.url = None;
        assert!(matches!(
            SupabaseBackend::new(&missing_url),
            Err(BackendError::NotConfigured(_))
        ));

        let mut missing_key = settings("https://x.supabase.co");
        missing_key.key = None;
        assert!(matches!(
            SupabaseBackend::new(&missing_key),
            Err(BackendError::NotConfigured(_))
        ));

        assert!(matches!(
            SupabaseBackend::new(&settings("not a url")),
            Err(BackendError::InvalidUrl(_))
        ));
        assert!(SupabaseBackend::new(&settings("ftp://x.supabase.co")).is_err());
    }

    #[test]
    fn test_public_url() {
        let backend = SupabaseBackend::new(&settings("https://x.supabase.co")).unwrap();
        assert_eq!(
            backend.public_url("2024/boat.jpg").as_deref(),
            Some("https://x.supabase.co/storage/v1/object/public/media-files/2024/boat.jpg")
        );
        assert_eq!(
            backend.public_url("/thumbs/a b.jpg").as_deref(),
            Some("https://x.supabase.co/storage/v1/object/public/media-files/thumbs/a%20b.jpg")
        );
        assert_eq!(backend.public_url(""), None);
    }

    #[test]
    fn test_public_url_keeps_path_prefix() {
        let backend = SupabaseBackend::new(&settings("http://localhost:54321/proxy")).unwrap();
        assert_eq!(
            backend.public_url("a.jpg").as_deref(),
            Some("http://localhost:54321/proxy/storage/v1/object/public/media-files/a.jpg")
        );
        assert_eq!(
            backend.rest_url("rpc/search_media_by_embedding").unwrap().as_str(),
            "http://localhost:54321/proxy/rest/v1/rpc/search_media_by_embedding"
        );
    }

    #[test]
    fn test_text_filter_quotes_reserved_characters() {
        assert_eq!(
            text_filter("boat"),
            r#"(description.ilike."*boat*",filename.ilike."*boat*",original_filename.ilike."*boat*",tags_text.ilike."*boat*")"#
        );
        assert_eq!(quote(r#"a,"b"(c)"#), r#""a,\"b\"(c)""#);
    }

    #[test]
    fn test_tags_match_case_insensitive_substring() {
        let filter = text_filter("Boat");
        assert!(filter.contains(r#"tags_text.ilike."*Boat*""#));
        assert!(!filter.contains("tags.cs"));
    }

    #[test]
    fn test_text_filter_escapes_like_wildcards() {
        assert_eq!(like_escape("100%"), r"100\%");
        assert_eq!(like_escape("img_01"), r"img\_01");
        assert_eq!(like_escape(r"a\b"), r"a\\b");
        // backslashes are doubled again by the PostgREST quoting
        assert!(text_filter("100%").contains(r#"description.ilike."*100\\%*""#));
    }

    #[test]
    fn test_text_search_query_filters() {
        let search = TextSearch {
            text: " boat ".to_string(),
            file_type: Some(FileType::Video),
            decade: Some("1960s".to_string()),
            candidates: 50,
        };
        let query = text_search_query(&search);
        assert!(query.contains(&("file_type", "eq.video".to_string())));
        assert!(query.contains(&("decade", "eq.1960s".to_string())));
        assert!(query.contains(&("limit", "50".to_string())));
        assert!(query[1].1.contains(r#""*boat*""#));
    }

    #[test]
    fn test_hybrid_body() {
        let search = EmbeddingSearch {
            query_embedding: vec![1.0],
            search_type: crate::search::SearchType::Combined,
            match_threshold: 0.0,
            match_count: 5,
            file_type_filter: None,
            decade_filter: None,
        };
        let body = serde_json::to_value(HybridBody {
            search: &search,
            query_text: "boat",
            weights: HybridWeights::default(),
        })
        .unwrap();
        assert_eq!(body["query_text"], "boat");
        assert_eq!(body["vector_weight"], 0.7);
        assert_eq!(body["text_weight"], 0.3);
        assert_eq!(body["match_count"], 5);
    }
}

//! Optional query translation.
//!
//! Translation is best effort: any failure hands back the original text.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const GOOGLE_TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";
const TARGET_LANGUAGE: &str = "en";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Translator: Send + Sync {
    fn is_available(&self) -> bool;

    /// Translate `text` from `source` to English. Returns `text` unchanged
    /// when translation is unavailable or fails.
    async fn translate(&self, text: &str, source: &str) -> String;
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

pub struct GoogleTranslator {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(api_key: &str) -> anyhow::Result<Self> {
        Self::with_endpoint(api_key, GOOGLE_TRANSLATE_URL)
    }

    pub fn with_endpoint(api_key: &str, endpoint: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    async fn send(&self, body: &TranslateRequest<'_>) -> reqwest::Result<TranslateResponse> {
        self.client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn request(&self, text: &str, source: &str) -> anyhow::Result<String> {
        let body = TranslateRequest {
            q: text,
            source,
            target: TARGET_LANGUAGE,
            format: "text",
        };

        // the url carries the api key
        let response = self.send(&body).await.map_err(reqwest::Error::without_url)?;

        response
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| anyhow::anyhow!("no translations in response"))
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn translate(&self, text: &str, source: &str) -> String {
        if !self.is_available() || text.trim().is_empty() || source == TARGET_LANGUAGE {
            return text.to_string();
        }

        match self.request(text, source).await {
            Ok(translated) if !translated.trim().is_empty() => {
                log::debug!("translated {text:?} -> {translated:?}");
                translated
            }
            Ok(_) => text.to_string(),
            Err(err) => {
                log::warn!("translation failed, using original text: {err}");
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_returns_original() {
        let translator = GoogleTranslator::new("").unwrap();
        assert!(!translator.is_available());
        assert_eq!(translator.translate("bátur", "is").await, "bátur");
    }

    #[tokio::test]
    async fn test_failure_returns_original() {
        // nothing listens on port 9 of localhost
        let translator =
            GoogleTranslator::with_endpoint("key", "http://127.0.0.1:9/translate").unwrap();
        assert!(translator.is_available());
        assert_eq!(translator.translate("bátur", "is").await, "bátur");
    }

    #[tokio::test]
    async fn test_english_source_is_not_translated() {
        let translator =
            GoogleTranslator::with_endpoint("key", "http://127.0.0.1:9/translate").unwrap();
        assert_eq!(translator.translate("boat", "en").await, "boat");
    }
}

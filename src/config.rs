use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::embedding::{find_model, Device, CATALOG, DEFAULT_BATCH_SIZE};

/// Default embedding model (multilingual, covers Icelandic queries)
const DEFAULT_MODEL: &str = "clip-ViT-B-32-multilingual-v1";
const DEFAULT_BUCKET: &str = "media-files";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CACHE_DIR: &str = ".fastembed_cache";
pub const DEFAULT_SOURCE_LANGUAGE: &str = "is";

/// Environment variables consulted for the backend access key, in order.
/// The first non-empty one wins.
pub const BACKEND_KEY_VARS: &[&str] = &[
    "SUPABASE_KEY",
    "SUPABASE_SERVICE_ROLE_KEY",
    "SUPABASE_SERVICE_KEY",
    "SUPABASE_ANON_KEY",
];
pub const BACKEND_URL_VAR: &str = "SUPABASE_URL";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. `*` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Value expected in the `X-API-Key` header. Unset means unauthenticated.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            api_key: None,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Catalog id of the embedding model (e.g. "clip-ViT-B-32")
    #[serde(default = "default_model")]
    pub model: String,

    /// "auto", "cpu", "cuda" or "mps"
    #[serde(default = "default_device")]
    pub device: String,

    /// Base url of a remote encoder service. When set, every model is
    /// served through it instead of the bundled ONNX runtime.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Directory where downloaded model files are cached
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Group size for batch image encoding
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            device: default_device(),
            endpoint: None,
            cache_dir: default_cache_dir(),
            batch_size: default_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    pub fn device(&self) -> anyhow::Result<Device> {
        self.device.parse()
    }
}

/// Backend settings as written in the config file. These are only
/// fallbacks: the environment is consulted again on every connection
/// attempt, see [`BackendSettings::resolve`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            bucket: default_bucket(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_source_language")]
    pub source_language: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            source_language: default_source_language(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_device() -> String {
    "auto".to_string()
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_source_language() -> String {
    DEFAULT_SOURCE_LANGUAGE.to_string()
}

/// Returns the value of `name` when it is set and not blank.
fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl Config {
    /// Load configuration from an optional yaml file, then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let config_str = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_yml::from_str(&config_str).context("config is malformed")?
            }
            None => Self::default(),
        };

        config.apply_env(env_lookup);
        config.validate()?;

        Ok(config)
    }

    /// Override file values with environment variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = non_empty(&lookup, "HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty(&lookup, "PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => log::warn!("ignoring invalid PORT value {port:?}"),
            }
        }
        if let Some(origins) = non_empty(&lookup, "CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        if let Some(api_key) = non_empty(&lookup, "API_KEY") {
            self.server.api_key = Some(api_key);
        }

        if let Some(model) = non_empty(&lookup, "CLIP_MODEL") {
            self.embedding.model = model;
        }
        if let Some(device) = non_empty(&lookup, "DEVICE") {
            self.embedding.device = device;
        }
        if let Some(endpoint) = non_empty(&lookup, "EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = Some(endpoint);
        }
        if let Some(cache_dir) = non_empty(&lookup, "EMBEDDING_CACHE_DIR") {
            self.embedding.cache_dir = cache_dir;
        }

        if let Some(bucket) = non_empty(&lookup, "SUPABASE_BUCKET") {
            self.backend.bucket = bucket;
        }

        if let Some(api_key) = non_empty(&lookup, "GOOGLE_TRANSLATE_API_KEY") {
            self.translation.api_key = Some(api_key);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if find_model(&self.embedding.model).is_none() {
            let available: Vec<_> = CATALOG.iter().map(|m| m.id).collect();
            bail!(
                "unknown embedding model {:?}. Available: {}",
                self.embedding.model,
                available.join(", ")
            );
        }

        self.embedding.device()?;

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be greater than 0");
        }

        if self.server.cors_origins.is_empty() {
            bail!("server.cors_origins must not be empty");
        }

        Ok(())
    }
}

/// Connection settings for the similarity backend, resolved at the time
/// of a connection attempt.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendSettings {
    pub url: Option<String>,
    pub key: Option<String>,
    pub bucket: String,
}

impl BackendSettings {
    /// Environment first, config file second. The key is taken from the
    /// first non-empty variable in [`BACKEND_KEY_VARS`].
    pub fn resolve(defaults: &BackendConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let url = non_empty(&lookup, BACKEND_URL_VAR).or_else(|| {
            defaults
                .url
                .clone()
                .filter(|url| !url.trim().is_empty())
        });

        let key = BACKEND_KEY_VARS
            .iter()
            .find_map(|name| non_empty(&lookup, name))
            .or_else(|| defaults.key.clone().filter(|key| !key.trim().is_empty()));

        let bucket =
            non_empty(&lookup, "SUPABASE_BUCKET").unwrap_or_else(|| defaults.bucket.clone());

        Self { url, key, bucket }
    }

    pub fn url_configured(&self) -> bool {
        self.url.is_some()
    }

    pub fn key_configured(&self) -> bool {
        self.key.is_some()
    }
}

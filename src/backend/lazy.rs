use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::{BackendError, BackendResult, SimilarityBackend, SupabaseBackend};
use crate::config::{env_lookup, BackendConfig, BackendSettings};

/// Where a [`LazyBackend`] gets its settings and connections from.
pub trait BackendSource: Send + Sync {
    /// Current settings. Called on every connection attempt.
    fn settings(&self) -> BackendSettings;

    fn connect(&self, settings: &BackendSettings) -> BackendResult<Arc<dyn SimilarityBackend>>;
}

/// Reads `SUPABASE_*` from the process environment, falling back to the
/// config file values.
pub struct EnvBackendSource {
    defaults: BackendConfig,
}

impl EnvBackendSource {
    pub fn new(defaults: BackendConfig) -> Self {
        Self { defaults }
    }
}

impl BackendSource for EnvBackendSource {
    fn settings(&self) -> BackendSettings {
        BackendSettings::resolve(&self.defaults, env_lookup)
    }

    fn connect(&self, settings: &BackendSettings) -> BackendResult<Arc<dyn SimilarityBackend>> {
        Ok(Arc::new(SupabaseBackend::new(settings)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    pub connected: bool,
    pub url_configured: bool,
    pub key_configured: bool,
}

/// Shared backend handle, constructed on first use.
///
/// While the slot is empty every [`LazyBackend::get`] makes a fresh attempt,
/// so credentials that show up after startup are picked up without a
/// restart. No lock is held during construction; concurrent attempts may
/// both succeed and the last one is kept.
pub struct LazyBackend {
    slot: RwLock<Option<Arc<dyn SimilarityBackend>>>,
    source: Box<dyn BackendSource>,
    failure_logged: AtomicBool,
}

impl LazyBackend {
    pub fn new(source: impl BackendSource + 'static) -> Self {
        Self {
            slot: RwLock::new(None),
            source: Box::new(source),
            failure_logged: AtomicBool::new(false),
        }
    }

    /// The backend handle without attempting construction.
    pub fn current(&self) -> Option<Arc<dyn SimilarityBackend>> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, backend: Arc<dyn SimilarityBackend>) {
        *self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(backend);
    }

    /// The backend handle, constructing it if the slot is empty.
    pub fn get(&self) -> BackendResult<Arc<dyn SimilarityBackend>> {
        if let Some(backend) = self.current() {
            return Ok(backend);
        }

        let settings = self.source.settings();
        match self.source.connect(&settings) {
            Ok(backend) => {
                log::info!("Similarity backend initialized");
                self.store(backend.clone());
                Ok(backend)
            }
            Err(err) => {
                if self.failure_logged.swap(true, Ordering::Relaxed) {
                    log::debug!("similarity backend still unavailable: {err}");
                } else {
                    log::warn!("similarity backend unavailable: {err}");
                }
                Err(err)
            }
        }
    }

    /// Attempts construction if needed and reports configuration presence.
    pub fn status(&self) -> BackendStatus {
        let connected = self.get().is_ok();
        let settings = self.source.settings();
        BackendStatus {
            connected,
            url_configured: settings.url_configured(),
            key_configured: settings.key_configured(),
        }
    }
}

/// Message for a request that cannot be served because the backend is
/// missing, naming what is missing.
pub fn not_ready_message(err: &BackendError) -> String {
    match err {
        BackendError::NotConfigured(reason) => format!("Search backend not initialized: {reason}"),
        other => format!("Search backend not initialized: {other}"),
    }
}

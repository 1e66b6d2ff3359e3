//! Image/text embedding providers.
//!
//! - `catalog`: the static list of supported CLIP configurations
//! - `provider`: the `EmbeddingProvider` capability trait and its errors
//! - `local`: CLIP ViT-B/32 executed in-process through fastembed
//! - `remote`: models served by an external encoder over HTTP
//! - `factory`: picks one of the two once, from configuration

mod catalog;
mod factory;
mod local;
pub(crate) mod provider;
mod remote;

pub use catalog::{find_model, ModelInfo, CATALOG};
pub use factory::create_provider;
pub use provider::{Device, Embedding, EmbeddingError, EmbeddingProvider, DEFAULT_BATCH_SIZE};

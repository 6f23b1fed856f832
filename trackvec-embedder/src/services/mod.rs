//! Pipeline stage implementations
//!
//! - [`audio_fetcher`]: object store retrieval
//! - [`signal_decoder`]: container/codec decoding to mono PCM
//! - [`embedding_provider`]: PCM to embedding vector

pub mod audio_fetcher;
pub mod embedding_provider;
pub mod signal_decoder;

pub use audio_fetcher::{fetcher_from_config, AudioFetcher, FilesystemStore, HttpObjectStore};
pub use embedding_provider::{EmbeddingProvider, HttpEmbeddingProvider, ModelInfo};
pub use signal_decoder::SignalDecoder;

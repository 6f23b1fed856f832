//! Database access for trackvec-embedder
//!
//! Pool creation and schema live in `trackvec_common::db`.

pub mod embeddings;

pub use embeddings::EmbeddingRepository;

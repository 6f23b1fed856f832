//! Utility modules for trackvec-embedder

pub mod retry;

pub use retry::{retry_transient, RetryPolicy};

//! Embedding workflow
//!
//! - [`pipeline`]: one trigger through fetch → decode → embed → persist
//! - [`backfill`]: batched runs for tracks with no embedding yet

pub mod backfill;
pub mod pipeline;

pub use backfill::{parse_manifest, Backfill, BackfillFailure, BackfillReport};
pub use pipeline::PipelineOrchestrator;

//! Data models for trackvec-embedder

pub mod embedding;
pub mod pipeline_state;
pub mod status;
pub mod track;

pub use embedding::{AudioBlob, AudioSignal, EmbeddingRecord, EmbeddingVector, UpsertOutcome};
pub use pipeline_state::{PipelineRun, PipelineState, Stage, StateTransition};
pub use status::{FailureStatus, SuccessStatus};
pub use track::{extension_hint, TrackReference, TriggerPayload, TriggerRecord};

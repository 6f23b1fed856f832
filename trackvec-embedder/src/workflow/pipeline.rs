//! Pipeline Orchestrator
//!
//! Runs one trigger through fetch → decode → embed → persist, strictly in
//! sequence. The first failing stage ends the run; nothing is written
//! unless every earlier stage succeeded.
//!
//! # Error Handling
//! - Payload validation happens before any I/O (`MissingField`)
//! - Fetch and persist are retried on transient errors
//! - Decode and embed are never retried
//! - Every stage runs under its own timeout
//! - Each failure is logged once here, with stage and cause

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use trackvec_common::config::PipelineSettings;

use crate::db::EmbeddingRepository;
use crate::error::{DecodeError, InferenceError, PersistenceError, PipelineError, RetrievalError};
use crate::models::{
    AudioBlob, AudioSignal, EmbeddingVector, PipelineRun, SuccessStatus, TrackReference,
    TriggerPayload, UpsertOutcome,
};
use crate::services::{AudioFetcher, EmbeddingProvider, SignalDecoder};
use crate::utils::{retry_transient, RetryPolicy};

/// Sequences the pipeline stages for one track at a time
///
/// Cheap to share: every collaborator is behind an `Arc` or a pool handle.
pub struct PipelineOrchestrator {
    fetcher: Arc<dyn AudioFetcher>,
    decoder: SignalDecoder,
    provider: Arc<dyn EmbeddingProvider>,
    repository: EmbeddingRepository,
    settings: PipelineSettings,
    retry: RetryPolicy,
}

impl PipelineOrchestrator {
    /// Create an orchestrator; the decoder targets the provider's sample rate
    pub fn new(
        fetcher: Arc<dyn AudioFetcher>,
        provider: Arc<dyn EmbeddingProvider>,
        repository: EmbeddingRepository,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher,
            decoder: SignalDecoder::new(provider.sample_rate()),
            provider,
            repository,
            retry: RetryPolicy::from_settings(&settings),
            settings,
        }
    }

    pub fn repository(&self) -> &EmbeddingRepository {
        &self.repository
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Process a trigger payload
    pub async fn process(&self, payload: &TriggerPayload) -> Result<SuccessStatus, PipelineError> {
        let reference = match TrackReference::from_payload(payload) {
            Ok(reference) => reference,
            Err(err) => {
                warn!(error = %err, "Rejected trigger payload");
                return Err(err);
            }
        };

        self.process_reference(&reference).await
    }

    /// Process an already validated track reference
    pub async fn process_reference(
        &self,
        reference: &TrackReference,
    ) -> Result<SuccessStatus, PipelineError> {
        let mut run = PipelineRun::new();

        info!(
            track_id = %reference.track_id,
            audio_path = %reference.audio_path,
            "Embedding pipeline started"
        );

        match self.run_stages(reference, &mut run).await {
            Ok(status) => {
                info!(
                    track_id = %reference.track_id,
                    outcome = status.outcome.as_str(),
                    dimension = status.dimension,
                    elapsed_ms = run.elapsed_ms() as u64,
                    "Embedding pipeline completed"
                );
                Ok(status)
            }
            Err(err) => {
                if let Some(stage) = err.stage() {
                    let transition = run.fail(stage);
                    debug!(
                        track_id = %reference.track_id,
                        from = ?transition.old_state,
                        to = ?transition.new_state,
                        "Pipeline state transition"
                    );
                }
                error!(
                    track_id = %reference.track_id,
                    stage = err.stage().map(|s| s.as_str()).unwrap_or("validate"),
                    kind = err.kind(),
                    error = %err,
                    elapsed_ms = run.elapsed_ms() as u64,
                    "Embedding pipeline failed"
                );
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        reference: &TrackReference,
        run: &mut PipelineRun,
    ) -> Result<SuccessStatus, PipelineError> {
        advance(run, reference);
        let blob = self.fetch(&reference.audio_path).await?;
        debug!(track_id = %reference.track_id, bytes = blob.len(), "Audio fetched");

        advance(run, reference);
        let signal = self.decode(blob).await?;
        debug!(
            track_id = %reference.track_id,
            samples = signal.len(),
            duration_seconds = signal.duration_seconds(),
            "Audio decoded"
        );

        advance(run, reference);
        let embedding = self.embed(signal).await?;

        advance(run, reference);
        let outcome = self.persist(&reference.track_id, &embedding).await?;

        advance(run, reference);
        Ok(SuccessStatus::new(
            reference.track_id.clone(),
            outcome,
            embedding.dimension(),
        ))
    }

    async fn fetch(&self, audio_path: &str) -> Result<AudioBlob, RetrievalError> {
        let timeout = self.settings.fetch_timeout();
        let fetcher = &self.fetcher;

        retry_transient("fetch", &self.retry, RetrievalError::is_transient, || async move {
            tokio::time::timeout(timeout, fetcher.fetch(audio_path))
                .await
                .unwrap_or(Err(RetrievalError::Timeout(timeout)))
        })
        .await
    }

    /// Consumes the blob; its bytes are gone once decoding returns
    async fn decode(&self, blob: AudioBlob) -> Result<AudioSignal, DecodeError> {
        self.decoder
            .decode_blob(blob, self.settings.decode_timeout())
            .await
    }

    /// Consumes the signal; the PCM buffer is dropped when this returns
    async fn embed(&self, signal: AudioSignal) -> Result<EmbeddingVector, InferenceError> {
        let timeout = self.settings.embed_timeout();

        let embedding = tokio::time::timeout(timeout, self.provider.embed(&signal))
            .await
            .unwrap_or(Err(InferenceError::Timeout(timeout)))?;

        let expected = self.repository.dimension();
        if embedding.dimension() != expected {
            return Err(InferenceError::DimensionMismatch {
                expected,
                actual: embedding.dimension(),
            });
        }
        if !embedding.is_finite() {
            return Err(InferenceError::NonFinite);
        }

        Ok(embedding)
    }

    async fn persist(
        &self,
        track_id: &str,
        embedding: &EmbeddingVector,
    ) -> Result<UpsertOutcome, PersistenceError> {
        let timeout = self.settings.persist_timeout();
        let repository = &self.repository;

        retry_transient("persist", &self.retry, PersistenceError::is_transient, || async move {
            tokio::time::timeout(timeout, repository.upsert(track_id, embedding))
                .await
                .unwrap_or(Err(PersistenceError::Timeout(timeout)))
        })
        .await
    }
}

/// Move to the next state on the success path and log the transition
fn advance(run: &mut PipelineRun, reference: &TrackReference) {
    let stage_elapsed_ms = run.stage_elapsed_ms() as u64;
    let transition = run.advance();
    debug!(
        track_id = %reference.track_id,
        from = ?transition.old_state,
        to = ?transition.new_state,
        stage_elapsed_ms,
        "Pipeline state transition"
    );
}

//! Backfill for tracks that have no embedding yet
//!
//! Tracks already embedded are skipped. The rest go through the regular
//! orchestrator in small concurrent batches with a pause between batches,
//! so a large catalogue never floods the model server.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use trackvec_common::config::BackfillSettings;

use crate::error::PersistenceError;
use crate::models::{TrackReference, TriggerPayload, TriggerRecord};
use crate::workflow::PipelineOrchestrator;

/// Track that could not be embedded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillFailure {
    pub track_id: String,
    pub message: String,
}

/// Summary of a backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    /// Distinct tracks offered
    pub total: usize,
    /// Tracks that already had an embedding
    pub skipped: usize,
    /// Tracks embedded by this run
    pub processed: usize,
    pub failed: Vec<BackfillFailure>,
}

impl BackfillReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Batched driver over the pipeline orchestrator
pub struct Backfill {
    orchestrator: Arc<PipelineOrchestrator>,
    batch_size: usize,
    batch_delay: Duration,
}

impl Backfill {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, settings: &BackfillSettings) -> Self {
        Self {
            orchestrator,
            batch_size: settings.batch_size.max(1),
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
        }
    }

    /// Embed every reference whose track has no record yet
    ///
    /// Per-track failures are collected in the report; only a failure to
    /// query the existing records aborts the run.
    pub async fn run(
        &self,
        references: Vec<TrackReference>,
    ) -> Result<BackfillReport, PersistenceError> {
        let mut seen = HashSet::new();
        let references: Vec<TrackReference> = references
            .into_iter()
            .filter(|r| seen.insert(r.track_id.clone()))
            .collect();

        let ids: Vec<String> = references.iter().map(|r| r.track_id.clone()).collect();
        let missing: HashSet<String> = self
            .orchestrator
            .repository()
            .missing(&ids)
            .await?
            .into_iter()
            .collect();

        let pending: Vec<TrackReference> = references
            .into_iter()
            .filter(|r| missing.contains(&r.track_id))
            .collect();

        let mut report = BackfillReport {
            total: ids.len(),
            skipped: ids.len() - pending.len(),
            ..Default::default()
        };

        info!(
            total = report.total,
            skipped = report.skipped,
            pending = pending.len(),
            batch_size = self.batch_size,
            "Backfill started"
        );

        let batch_count = pending.len().div_ceil(self.batch_size);

        for (batch_idx, batch) in pending.chunks(self.batch_size).enumerate() {
            let results = join_all(
                batch
                    .iter()
                    .map(|reference| self.orchestrator.process_reference(reference)),
            )
            .await;

            for (reference, result) in batch.iter().zip(results) {
                match result {
                    Ok(_) => report.processed += 1,
                    Err(err) => report.failed.push(BackfillFailure {
                        track_id: reference.track_id.clone(),
                        message: err.to_string(),
                    }),
                }
            }

            info!(
                batch = batch_idx + 1,
                batches = batch_count,
                processed = report.processed,
                failed = report.failed.len(),
                "Backfill batch complete"
            );

            if batch_idx + 1 < batch_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        if report.is_success() {
            info!(processed = report.processed, "Backfill complete");
        } else {
            warn!(
                processed = report.processed,
                failed = report.failed.len(),
                "Backfill complete with failures"
            );
        }

        Ok(report)
    }
}

/// Parse a manifest: a JSON array of `{id, mainAudioFilePath}` records
///
/// Entries missing either field are returned as failures instead of
/// failing the whole manifest.
pub fn parse_manifest(
    json: &str,
) -> Result<(Vec<TrackReference>, Vec<BackfillFailure>), serde_json::Error> {
    let records: Vec<TriggerRecord> = serde_json::from_str(json)?;

    let mut references = Vec::with_capacity(records.len());
    let mut invalid = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        let label = record
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("#{}", index));

        let payload = TriggerPayload {
            record: Some(record),
        };
        match TrackReference::from_payload(&payload) {
            Ok(reference) => references.push(reference),
            Err(err) => invalid.push(BackfillFailure {
                track_id: label,
                message: err.to_string(),
            }),
        }
    }

    Ok((references, invalid))
}

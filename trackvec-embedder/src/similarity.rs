//! Similar-track search by cosine similarity
//!
//! Brute force over every stored embedding. The catalogue is scored in
//! memory; the source track itself is never part of the result.

use serde::{Deserialize, Serialize};

use crate::db::EmbeddingRepository;
use crate::error::PersistenceError;
use crate::models::EmbeddingRecord;

pub const DEFAULT_MATCH_COUNT: usize = 5;
pub const MAX_MATCH_COUNT: usize = 100;
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarTrack {
    pub track_id: String,
    pub similarity: f32,
}

/// Tracks most similar to `track_id`
///
/// Returns an empty list when the source track has no embedding.
pub async fn find_similar(
    repository: &EmbeddingRepository,
    track_id: &str,
    count: usize,
    threshold: f32,
) -> Result<Vec<SimilarTrack>, PersistenceError> {
    let Some(source) = repository.get(track_id).await? else {
        tracing::debug!(track_id, "No embedding for similarity source");
        return Ok(Vec::new());
    };

    let candidates = repository.all().await?;
    Ok(rank(&source, &candidates, count, threshold))
}

/// Score `candidates` against `source`
///
/// Keeps scores ≥ `threshold`, best first (ties by track id), at most
/// `count` (capped at [`MAX_MATCH_COUNT`]).
pub fn rank(
    source: &EmbeddingRecord,
    candidates: &[EmbeddingRecord],
    count: usize,
    threshold: f32,
) -> Vec<SimilarTrack> {
    let count = count.min(MAX_MATCH_COUNT);
    if count == 0 {
        return Vec::new();
    }

    let mut hits: Vec<SimilarTrack> = candidates
        .iter()
        .filter(|c| c.track_id != source.track_id)
        .filter_map(|c| {
            source.embedding.cosine_similarity(&c.embedding).map(|similarity| SimilarTrack {
                track_id: c.track_id.clone(),
                similarity,
            })
        })
        .filter(|hit| hit.similarity >= threshold)
        .collect();

    hits.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.track_id.cmp(&b.track_id))
    });
    hits.truncate(count);
    hits
}

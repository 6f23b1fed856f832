//! Audio and embedding data carried through the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw audio object as retrieved from the object store
///
/// Owns the downloaded bytes; dropping it releases the buffer.
#[derive(Debug, Clone)]
pub struct AudioBlob {
    /// Object store path the bytes came from
    pub path: String,
    pub bytes: Vec<u8>,
}

impl AudioBlob {
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decoded mono PCM at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    /// Mono samples (f32, nominal range [-1.0, 1.0])
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioSignal {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Fixed-dimension embedding produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// True when no component is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Cosine similarity in [-1.0, 1.0]; `None` on dimension mismatch or zero norm
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> Option<f32> {
        if self.dimension() != other.dimension() || self.0.is_empty() {
            return None;
        }

        let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let (a, b) = (*a as f64, *b as f64);
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        if norm_a == 0.0 || norm_b == 0.0 {
            return None;
        }

        Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32)
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Persisted embedding, one per track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRecord {
    pub track_id: String,
    pub embedding: EmbeddingVector,
    /// Number of times this record has been written (1 after insert)
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "outcome")]
pub enum UpsertOutcome {
    /// No record existed; one was inserted
    Created,
    /// An existing record was overwritten
    Updated { revision: i64 },
}

impl UpsertOutcome {
    pub fn from_revision(revision: i64) -> Self {
        if revision <= 1 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated { revision }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated { .. } => "updated",
        }
    }
}

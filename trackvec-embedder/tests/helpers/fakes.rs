//! In-process stand-ins for the object store and the model server

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use trackvec_embedder::error::{InferenceError, RetrievalError};
use trackvec_embedder::models::{AudioBlob, AudioSignal, EmbeddingVector};
use trackvec_embedder::services::{AudioFetcher, EmbeddingProvider};

/// Object store backed by a map, counting fetches
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
    /// Remaining fetches that fail with a transient error
    transient_failures: AtomicUsize,
    /// Latency added to every fetch
    delay: Mutex<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
    }

    pub fn fail_next(&self, times: usize) {
        self.transient_failures.store(times, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioFetcher for MemoryStore {
    async fn fetch(&self, audio_path: &str) -> Result<AudioBlob, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RetrievalError::Interrupted {
                path: audio_path.to_string(),
                reason: "connection reset".to_string(),
            });
        }

        self.objects
            .lock()
            .unwrap()
            .get(audio_path)
            .cloned()
            .map(|bytes| AudioBlob::new(audio_path, bytes))
            .ok_or_else(|| RetrievalError::NotFound(audio_path.to_string()))
    }
}

/// What the fake model returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// Deterministic vector derived from the signal
    Normal,
    /// Every call fails
    Failing,
    /// Vectors one element too long
    WrongDimension,
}

/// Deterministic embedding model with the real provider's input checks
pub struct FakeProvider {
    dimension: usize,
    sample_rate: u32,
    mode: ProviderMode,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(dimension: usize, sample_rate: u32) -> Self {
        Self::with_mode(dimension, sample_rate, ProviderMode::Normal)
    }

    pub fn with_mode(dimension: usize, sample_rate: u32, mode: ProviderMode) -> Self {
        Self {
            dimension,
            sample_rate,
            mode,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every `embed` call take at least `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    fn model_id(&self) -> &str {
        "fake-model"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn embed(&self, signal: &AudioSignal) -> Result<EmbeddingVector, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if signal.is_empty() {
            return Err(InferenceError::EmptySignal);
        }
        if signal.sample_rate != self.sample_rate {
            return Err(InferenceError::SampleRateMismatch {
                expected: self.sample_rate,
                actual: signal.sample_rate,
            });
        }

        match self.mode {
            ProviderMode::Failing => Err(InferenceError::Capability("model crashed".to_string())),
            ProviderMode::WrongDimension => Ok(EmbeddingVector::new(vec![0.5; self.dimension + 1])),
            ProviderMode::Normal => {
                let rms = (signal.samples.iter().map(|s| s * s).sum::<f32>()
                    / signal.len() as f32)
                    .sqrt();
                let values = (0..self.dimension)
                    .map(|i| 1.0 + rms * (i as f32 + 1.0))
                    .collect();
                Ok(EmbeddingVector::new(values))
            }
        }
    }
}

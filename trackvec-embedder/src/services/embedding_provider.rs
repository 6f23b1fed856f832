//! Embedding provider
//!
//! The model itself is a black box behind [`EmbeddingProvider`]: mono PCM
//! at a fixed sample rate in, fixed-length float vector out. The concrete
//! backend talks to a model server over HTTP:
//!
//! - `GET  {base_url}/info`  → `{"model", "dimension", "sample_rate"}`
//! - `POST {base_url}/embed` ← `{"sample_rate", "samples"}` → `{"embedding"}`
//!
//! The provider is initialized once per process and then shared read-only.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trackvec_common::config::ProviderConfig;

use crate::error::{InferenceError, InitializationError};
use crate::models::{AudioSignal, EmbeddingVector};

const USER_AGENT: &str = concat!("trackvec-embedder/", env!("CARGO_PKG_VERSION"));

/// Maps a PCM signal to an embedding vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier reported by the backend
    fn model_id(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Sample rate `embed` requires, in Hz
    fn sample_rate(&self) -> u32;

    /// Compute the embedding of `signal`
    ///
    /// The signal must be non-empty and at [`Self::sample_rate`]; the
    /// provider never resamples.
    async fn embed(&self, signal: &AudioSignal) -> Result<EmbeddingVector, InferenceError>;
}

/// Model description returned by the server's `/info` endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub dimension: usize,
    pub sample_rate: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    sample_rate: u32,
    samples: &'a [f32],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Model server client
#[derive(Debug)]
pub struct HttpEmbeddingProvider {
    http_client: reqwest::Client,
    base_url: Url,
    info: ModelInfo,
    timeout: Duration,
}

impl HttpEmbeddingProvider {
    /// Connect to the model server and check it serves the expected model
    ///
    /// Fails if the server is unreachable or describes a model whose id,
    /// dimension or sample rate differs from `config`. An empty
    /// `config.model_id` accepts any model.
    pub async fn initialize(
        config: &ProviderConfig,
        timeout: Duration,
    ) -> Result<Self, InitializationError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| InitializationError::Unreachable {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| InitializationError::Unreachable {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        let info_url = endpoint(&base_url, "info").ok_or_else(|| {
            InitializationError::Unreachable {
                url: config.base_url.clone(),
                reason: "URL cannot be a base".to_string(),
            }
        })?;

        tracing::info!(url = %info_url, "Querying embedding model server");

        let response = http_client
            .get(info_url.clone())
            .send()
            .await
            .map_err(|e| InitializationError::Unreachable {
                url: info_url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InitializationError::BadResponse(format!(
                "HTTP {} from {}",
                status.as_u16(),
                info_url
            )));
        }

        let info: ModelInfo = response
            .json()
            .await
            .map_err(|e| InitializationError::BadResponse(e.to_string()))?;

        if !config.model_id.is_empty() && info.model != config.model_id {
            return Err(InitializationError::ModelMismatch {
                expected: config.model_id.clone(),
                actual: info.model,
            });
        }
        if info.dimension != config.dimension {
            return Err(InitializationError::DimensionMismatch {
                expected: config.dimension,
                actual: info.dimension,
            });
        }
        if info.sample_rate != config.sample_rate {
            return Err(InitializationError::SampleRateMismatch {
                expected: config.sample_rate,
                actual: info.sample_rate,
            });
        }

        tracing::info!(
            model = %info.model,
            dimension = info.dimension,
            sample_rate = info.sample_rate,
            "Embedding model ready"
        );

        Ok(Self {
            http_client,
            base_url,
            info,
            timeout,
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.info.model
    }

    fn dimension(&self) -> usize {
        self.info.dimension
    }

    fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    async fn embed(&self, signal: &AudioSignal) -> Result<EmbeddingVector, InferenceError> {
        if signal.is_empty() {
            return Err(InferenceError::EmptySignal);
        }
        if signal.sample_rate != self.info.sample_rate {
            return Err(InferenceError::SampleRateMismatch {
                expected: self.info.sample_rate,
                actual: signal.sample_rate,
            });
        }

        let url = endpoint(&self.base_url, "embed")
            .ok_or_else(|| InferenceError::Capability("model server URL is invalid".to_string()))?;

        let response = self
            .http_client
            .post(url)
            .json(&EmbedRequest {
                sample_rate: signal.sample_rate,
                samples: &signal.samples,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(self.timeout)
                } else {
                    InferenceError::Capability(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Capability(format!(
                "model server returned HTTP {}: {}",
                status.as_u16(),
                error_text.trim()
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Capability(format!("invalid embed response: {}", e)))?;

        let vector = EmbeddingVector::new(body.embedding);
        if vector.dimension() != self.info.dimension {
            return Err(InferenceError::DimensionMismatch {
                expected: self.info.dimension,
                actual: vector.dimension(),
            });
        }
        if !vector.is_finite() {
            return Err(InferenceError::NonFinite);
        }

        Ok(vector)
    }
}

fn endpoint(base_url: &Url, name: &str) -> Option<Url> {
    let mut url = base_url.clone();
    url.path_segments_mut().ok()?.pop_if_empty().push(name);
    Some(url)
}

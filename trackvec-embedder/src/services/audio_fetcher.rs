//! Audio fetcher
//!
//! Retrieves the raw bytes of an audio object by path. The bytes are not
//! interpreted here.
//!
//! Two backends:
//! - [`HttpObjectStore`]: `GET {base_url}/object/{bucket}/{path}` with the
//!   service key as bearer token
//! - [`FilesystemStore`]: files below a local root directory

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use trackvec_common::config::{StorageBackend, StorageConfig};

use crate::error::RetrievalError;
use crate::models::AudioBlob;

const USER_AGENT: &str = concat!("trackvec-embedder/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only access to audio objects
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Fetch the full object at `audio_path`
    async fn fetch(&self, audio_path: &str) -> Result<AudioBlob, RetrievalError>;
}

/// Split an object path into its segments
///
/// Leading and repeated slashes are ignored. `.` and `..` segments are
/// rejected so a path can never leave its bucket or root.
pub fn object_segments(audio_path: &str) -> Result<Vec<&str>, RetrievalError> {
    let segments: Vec<&str> = audio_path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return Err(RetrievalError::InvalidPath(audio_path.to_string()));
    }
    if segments.iter().any(|s| *s == "." || *s == ".." || s.contains('\\')) {
        return Err(RetrievalError::InvalidPath(audio_path.to_string()));
    }

    Ok(segments)
}

/// HTTP object store client
pub struct HttpObjectStore {
    http_client: reqwest::Client,
    base_url: Url,
    bucket: String,
    service_key: Option<String>,
    timeout: Duration,
}

impl HttpObjectStore {
    /// Create a client for `bucket` under `base_url`
    pub fn new(
        base_url: &str,
        bucket: impl Into<String>,
        service_key: Option<String>,
        timeout: Duration,
    ) -> trackvec_common::Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            trackvec_common::Error::Config(format!("Invalid storage URL {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(trackvec_common::Error::Config(format!(
                "Storage URL cannot be a base: {}",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| trackvec_common::Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            bucket: bucket.into(),
            service_key,
            timeout,
        })
    }

    pub fn from_config(config: &StorageConfig, timeout: Duration) -> trackvec_common::Result<Self> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            trackvec_common::Error::Config("storage.base_url is not set".to_string())
        })?;
        Self::new(base_url, config.bucket.clone(), config.service_key.clone(), timeout)
    }

    /// URL of an object, each path segment percent-encoded
    pub fn object_url(&self, audio_path: &str) -> Result<Url, RetrievalError> {
        let segments = object_segments(audio_path)?;

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RetrievalError::InvalidPath(audio_path.to_string()))?
            .pop_if_empty()
            .push("object")
            .push(&self.bucket)
            .extend(segments);

        Ok(url)
    }

    fn map_transport_error(&self, audio_path: &str, err: reqwest::Error) -> RetrievalError {
        if err.is_timeout() {
            RetrievalError::Timeout(self.timeout)
        } else {
            RetrievalError::Interrupted {
                path: audio_path.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl AudioFetcher for HttpObjectStore {
    async fn fetch(&self, audio_path: &str) -> Result<AudioBlob, RetrievalError> {
        let url = self.object_url(audio_path)?;

        tracing::debug!(path = %audio_path, url = %url, "Fetching audio object");

        let mut request = self.http_client.get(url);
        if let Some(key) = &self.service_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(audio_path, e))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(RetrievalError::NotFound(audio_path.to_string()));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RetrievalError::AccessDenied {
                path: audio_path.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        if !status.is_success() {
            return Err(RetrievalError::Upstream {
                status: status.as_u16(),
                path: audio_path.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(audio_path, e))?;

        tracing::debug!(path = %audio_path, bytes = bytes.len(), "Fetched audio object");

        Ok(AudioBlob::new(audio_path, bytes.to_vec()))
    }
}

/// Object store backed by a local directory
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Absolute location of an object below the root
    pub fn resolve(&self, audio_path: &str) -> Result<PathBuf, RetrievalError> {
        if audio_path.starts_with('/') {
            return Err(RetrievalError::InvalidPath(audio_path.to_string()));
        }

        let segments = object_segments(audio_path)?;
        Ok(segments
            .into_iter()
            .fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

#[async_trait]
impl AudioFetcher for FilesystemStore {
    async fn fetch(&self, audio_path: &str) -> Result<AudioBlob, RetrievalError> {
        let file_path = self.resolve(audio_path)?;

        tracing::debug!(path = %audio_path, file = %file_path.display(), "Reading audio object");

        match tokio::fs::metadata(&file_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(RetrievalError::NotFound(audio_path.to_string())),
            Err(e) => return Err(map_io_error(audio_path, e)),
        }

        let bytes = tokio::fs::read(&file_path)
            .await
            .map_err(|e| map_io_error(audio_path, e))?;

        Ok(AudioBlob::new(audio_path, bytes))
    }
}

fn map_io_error(audio_path: &str, err: std::io::Error) -> RetrievalError {
    match err.kind() {
        std::io::ErrorKind::NotFound => RetrievalError::NotFound(audio_path.to_string()),
        std::io::ErrorKind::PermissionDenied => RetrievalError::AccessDenied {
            path: audio_path.to_string(),
            reason: err.to_string(),
        },
        _ => RetrievalError::Interrupted {
            path: audio_path.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Build the configured fetcher
///
/// `objects_root` is used by the filesystem backend when `storage.root` is
/// not set.
pub fn fetcher_from_config(
    config: &StorageConfig,
    objects_root: PathBuf,
    timeout: Duration,
) -> trackvec_common::Result<Arc<dyn AudioFetcher>> {
    match config.backend {
        StorageBackend::Http => {
            let store = HttpObjectStore::from_config(config, timeout)?;
            tracing::info!(
                base_url = %store.base_url,
                bucket = %store.bucket,
                authenticated = store.service_key.is_some(),
                "Using HTTP object store"
            );
            Ok(Arc::new(store))
        }
        StorageBackend::Filesystem => {
            let root = config.root.clone().unwrap_or(objects_root);
            tracing::info!(root = %root.display(), "Using filesystem object store");
            Ok(Arc::new(FilesystemStore::new(root)))
        }
    }
}

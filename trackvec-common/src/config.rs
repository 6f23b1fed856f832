//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Any key missing from the
//! file falls back to a compiled default, and a missing file is not an error:
//! the service starts on defaults with a warning. A handful of environment
//! variables override the file so deployments can inject secrets and URLs
//! without editing it.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TRACKVEC_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "TRACKVEC_CONFIG";
pub const ENV_ROOT_FOLDER: &str = "TRACKVEC_ROOT_FOLDER";
pub const ENV_DATABASE_PATH: &str = "TRACKVEC_DATABASE_PATH";
pub const ENV_BIND: &str = "TRACKVEC_BIND";
pub const ENV_STORAGE_URL: &str = "TRACKVEC_STORAGE_URL";
pub const ENV_STORAGE_SERVICE_KEY: &str = "TRACKVEC_STORAGE_SERVICE_KEY";
pub const ENV_PROVIDER_URL: &str = "TRACKVEC_PROVIDER_URL";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "trackvec.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder for the database and local object store (optional)
    pub root_folder: Option<PathBuf>,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub provider: ProviderConfig,
    pub pipeline: PipelineSettings,
    pub backfill: BackfillSettings,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5780".to_string(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Explicit database file; defaults to `<root_folder>/trackvec.db`
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 10,
            busy_timeout_ms: 5000,
        }
    }
}

/// Which object store the fetcher talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Remote object store addressed as `{base_url}/object/{bucket}/{path}`
    #[default]
    Http,
    /// Local directory tree, paths resolved below `root`
    Filesystem,
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Base URL of the HTTP object store (e.g. `https://project.example.co/storage/v1`)
    pub base_url: Option<String>,
    pub bucket: String,
    /// Service key sent as bearer token
    pub service_key: Option<String>,
    /// Root directory for the filesystem backend; defaults to `<root_folder>/objects`
    pub root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Http,
            base_url: None,
            bucket: "tracks".to_string(),
            service_key: None,
            root: None,
        }
    }
}

/// Embedding model server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Model the server is expected to report
    pub model_id: String,
    /// Expected embedding dimension
    pub dimension: usize,
    /// Sample rate the model consumes, in Hz
    pub sample_rate: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8500".to_string(),
            model_id: "laion/larger_clap_music_and_speech".to_string(),
            dimension: 512,
            sample_rate: 48_000,
        }
    }
}

/// Per-stage timeouts and retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub fetch_timeout_secs: u64,
    pub decode_timeout_secs: u64,
    pub embed_timeout_secs: u64,
    pub persist_timeout_secs: u64,
    /// Total attempts for transient fetch/persist failures (1 = no retry)
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 60,
            decode_timeout_secs: 120,
            embed_timeout_secs: 300,
            persist_timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
        }
    }
}

impl PipelineSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_secs(self.persist_timeout_secs)
    }
}

/// Backfill batching
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackfillSettings {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay_ms: 2000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Locate and load the config file, falling back to defaults
    ///
    /// An explicitly named file (argument or `TRACKVEC_CONFIG`) must exist.
    /// The platform default location is optional. Nothing is logged here so
    /// this can run before tracing is installed; report the
    /// [`ConfigSource`] afterwards instead.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(&ConfigSource::locate(explicit))
    }

    pub fn load_from(source: &ConfigSource) -> Result<Self> {
        match source.path() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply `TRACKVEC_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Ok(bind) = std::env::var(ENV_BIND) {
            self.server.bind = bind;
        }
        if let Ok(url) = std::env::var(ENV_STORAGE_URL) {
            self.storage.base_url = Some(url);
        }
        if let Ok(key) = std::env::var(ENV_STORAGE_SERVICE_KEY) {
            self.storage.service_key = Some(key);
        }
        if let Ok(url) = std::env::var(ENV_PROVIDER_URL) {
            self.provider.base_url = url;
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.provider.dimension == 0 {
            return Err(Error::Config("provider.dimension must be positive".to_string()));
        }
        if self.provider.sample_rate == 0 {
            return Err(Error::Config("provider.sample_rate must be positive".to_string()));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(Error::Config("pipeline.max_attempts must be at least 1".to_string()));
        }
        if self.backfill.batch_size == 0 {
            return Err(Error::Config("backfill.batch_size must be at least 1".to_string()));
        }
        if self.storage.backend == StorageBackend::Http && self.storage.base_url.is_none() {
            return Err(Error::Config(format!(
                "storage.base_url is required for the http backend (or set {})",
                ENV_STORAGE_URL
            )));
        }
        Ok(())
    }
}

/// Platform config file location: `<config_dir>/trackvec/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trackvec").join("config.toml"))
}

/// Where the configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` argument
    Argument(PathBuf),
    /// `TRACKVEC_CONFIG` environment variable
    Environment(PathBuf),
    /// Platform config directory
    DefaultLocation(PathBuf),
    /// No file; built-in defaults
    BuiltIn,
}

impl ConfigSource {
    /// Pick the config file: argument, then environment, then the
    /// platform default location if that file exists
    pub fn locate(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return ConfigSource::Argument(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(ENV_CONFIG) {
            if !path.trim().is_empty() {
                return ConfigSource::Environment(PathBuf::from(path));
            }
        }

        match default_config_path() {
            Some(path) if path.exists() => ConfigSource::DefaultLocation(path),
            _ => ConfigSource::BuiltIn,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Argument(path)
            | ConfigSource::Environment(path)
            | ConfigSource::DefaultLocation(path) => Some(path),
            ConfigSource::BuiltIn => None,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Argument(path) => write!(f, "{} (--config)", path.display()),
            ConfigSource::Environment(path) => {
                write!(f, "{} ({})", path.display(), ENV_CONFIG)
            }
            ConfigSource::DefaultLocation(path) => write!(f, "{}", path.display()),
            ConfigSource::BuiltIn => write!(f, "built-in defaults"),
        }
    }
}

/// Resolve the root folder following the priority order in the module docs
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ENV_ROOT_FOLDER) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("trackvec"))
        .unwrap_or_else(|| PathBuf::from("./trackvec_data"))
}

/// Prepares the root folder and derives paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    /// Database path, honoring an explicit `database.path`
    pub fn database_path(&self, config: &TomlConfig) -> PathBuf {
        config
            .database
            .path
            .clone()
            .unwrap_or_else(|| self.root_folder.join(DATABASE_FILE_NAME))
    }

    /// Filesystem object store root, honoring an explicit `storage.root`
    pub fn objects_path(&self, config: &TomlConfig) -> PathBuf {
        config
            .storage
            .root
            .clone()
            .unwrap_or_else(|| self.root_folder.join("objects"))
    }
}

//! trackvec-embedder - Audio Embedding Service
//!
//! Computes a fixed-length embedding for each track's audio and stores it
//! keyed by track id, so similar tracks can be found by vector proximity.
//!
//! Commands:
//! - `serve` (default): HTTP service with the webhook entry point
//! - `process`: one-shot run for a single track
//! - `backfill`: embed every track in a manifest that has no embedding yet

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trackvec_common::config::{
    resolve_root_folder, ConfigSource, RootFolderInitializer, TomlConfig,
};
use trackvec_common::db::init_database;

use trackvec_embedder::db::EmbeddingRepository;
use trackvec_embedder::models::TriggerPayload;
use trackvec_embedder::services::{fetcher_from_config, HttpEmbeddingProvider};
use trackvec_embedder::workflow::{parse_manifest, Backfill};
use trackvec_embedder::{AppState, PipelineOrchestrator};

/// Command-line arguments for trackvec-embedder
#[derive(Parser, Debug)]
#[command(name = "trackvec-embedder")]
#[command(about = "Audio embedding pipeline service")]
#[command(version)]
struct Args {
    /// TOML configuration file (falls back to TRACKVEC_CONFIG, then the
    /// platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder for the database and local object store
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve {
        /// Socket address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Embed a single track and print the result
    Process {
        #[arg(long)]
        track_id: String,
        #[arg(long)]
        audio_path: String,
    },
    /// Embed every manifest track that has no embedding yet
    Backfill {
        /// JSON array of {"id", "mainAudioFilePath"} records
        #[arg(long)]
        manifest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Config decides the log level, so it loads before tracing exists and
    // its source is reported once tracing is up
    let config_source = ConfigSource::locate(args.config.as_deref());
    let mut config = TomlConfig::load_from(&config_source)
        .with_context(|| format!("Failed to load configuration from {}", config_source))?;
    config.apply_env_overrides();

    init_tracing(&config.logging.level);

    info!(
        "Starting trackvec-embedder v{} ({} {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );
    if config_source == ConfigSource::BuiltIn {
        warn!("No config file found, using built-in defaults");
    } else {
        info!("Configuration: {}", config_source);
    }

    let command = args.command.unwrap_or(Command::Serve { bind: None });
    if let Command::Serve { bind: Some(bind) } = &command {
        config.server.bind = bind.clone();
    }
    config.validate().context("Invalid configuration")?;

    // Step 1: Resolve and create the root folder
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    // Step 2: Open or create the database
    let db_path = initializer.database_path(&config);
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path, &config.database)
        .await
        .context("Failed to open database")?;

    // Step 3: Bring up the embedding model once for the whole process
    let provider = HttpEmbeddingProvider::initialize(&config.provider, config.pipeline.embed_timeout())
        .await
        .context("Failed to initialize embedding model")?;

    // Step 4: Wire the pipeline
    let fetcher = fetcher_from_config(
        &config.storage,
        initializer.objects_path(&config),
        config.pipeline.fetch_timeout(),
    )
    .context("Failed to configure object store")?;
    let repository = EmbeddingRepository::new(pool.clone(), config.provider.dimension);
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        fetcher,
        Arc::new(provider),
        repository,
        config.pipeline.clone(),
    ));

    let exit = match command {
        Command::Serve { .. } => serve(&config.server.bind, orchestrator).await?,
        Command::Process {
            track_id,
            audio_path,
        } => process_one(&orchestrator, track_id, audio_path).await?,
        Command::Backfill { manifest } => {
            let backfill = Backfill::new(orchestrator, &config.backfill);
            run_backfill(&backfill, &manifest).await?
        }
    };

    pool.close().await;
    Ok(exit)
}

fn init_tracing(level: &str) {
    let default_filter = format!(
        "trackvec_embedder={level},trackvec_common={level},tower_http={level}",
        level = level
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(bind: &str, orchestrator: Arc<PipelineOrchestrator>) -> Result<ExitCode> {
    let app = trackvec_embedder::build_router(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Webhook: POST http://{}/embeddings/generate", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(ExitCode::SUCCESS)
}

async fn process_one(
    orchestrator: &PipelineOrchestrator,
    track_id: String,
    audio_path: String,
) -> Result<ExitCode> {
    let payload = TriggerPayload::new(track_id, audio_path);

    match orchestrator.process(&payload).await {
        Ok(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.to_failure_status())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_backfill(backfill: &Backfill, manifest: &std::path::Path) -> Result<ExitCode> {
    let content = tokio::fs::read_to_string(manifest)
        .await
        .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
    let (references, invalid) = parse_manifest(&content)
        .with_context(|| format!("Failed to parse manifest {}", manifest.display()))?;

    for entry in &invalid {
        error!(track_id = %entry.track_id, error = %entry.message, "Skipping invalid manifest entry");
    }

    let mut report = backfill.run(references).await.context("Backfill failed")?;
    report.total += invalid.len();
    report.failed.extend(invalid);

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

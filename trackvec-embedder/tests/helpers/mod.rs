//! Test Helper Utilities
//!
//! Shared utilities for testing trackvec-embedder

#![allow(dead_code)]

pub mod audio_generator;
pub mod fakes;

use sqlx::SqlitePool;
use std::sync::Arc;
use trackvec_common::config::PipelineSettings;
use trackvec_common::db::init_memory_database;
use trackvec_embedder::db::EmbeddingRepository;
use trackvec_embedder::PipelineOrchestrator;

pub use audio_generator::{generate_test_wav, short_tone, AudioConfig};
pub use fakes::{FakeProvider, MemoryStore, ProviderMode};

pub const TEST_DIMENSION: usize = 16;
pub const TEST_SAMPLE_RATE: u32 = 48_000;

/// Pipeline settings with millisecond backoff so retry tests stay fast
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        ..PipelineSettings::default()
    }
}

/// Everything a pipeline test needs to inspect
pub struct TestPipeline {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<FakeProvider>,
    pub repository: EmbeddingRepository,
}

/// Orchestrator over an in-memory store, fake model and in-memory database
pub async fn create_test_pipeline() -> TestPipeline {
    create_test_pipeline_with(FakeProvider::new(TEST_DIMENSION, TEST_SAMPLE_RATE)).await
}

pub async fn create_test_pipeline_with(provider: FakeProvider) -> TestPipeline {
    let pool = init_memory_database().await.unwrap();
    create_pipeline(pool, provider, fast_settings())
}

/// Orchestrator over an in-memory store and fake model, writing to `pool`
pub fn create_pipeline(
    pool: SqlitePool,
    provider: FakeProvider,
    settings: PipelineSettings,
) -> TestPipeline {
    let repository = EmbeddingRepository::new(pool, TEST_DIMENSION);
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(provider);

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        store.clone(),
        provider.clone(),
        repository.clone(),
        settings,
    ));

    TestPipeline {
        orchestrator,
        store,
        provider,
        repository,
    }
}

//! Embedding persistence
//!
//! One row per track in `track_embeddings`. Writes go through a single
//! `INSERT … ON CONFLICT(track_id) DO UPDATE` statement, so concurrent runs
//! for the same track leave exactly one record (last write wins).

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashSet;

use crate::error::PersistenceError;
use crate::models::{EmbeddingRecord, EmbeddingVector, UpsertOutcome};

/// SQLite bound-parameter budget per `IN (…)` query
const MAX_IDS_PER_QUERY: usize = 500;

/// Embedding store for vectors of one fixed dimension
#[derive(Debug, Clone)]
pub struct EmbeddingRepository {
    pool: SqlitePool,
    dimension: usize,
}

impl EmbeddingRepository {
    pub fn new(pool: SqlitePool, dimension: usize) -> Self {
        Self { pool, dimension }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Create or overwrite the embedding for `track_id`
    ///
    /// Vectors of the wrong dimension or with non-finite values are
    /// rejected before touching the database.
    pub async fn upsert(
        &self,
        track_id: &str,
        embedding: &EmbeddingVector,
    ) -> Result<UpsertOutcome, PersistenceError> {
        if embedding.dimension() != self.dimension {
            return Err(PersistenceError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }
        if !embedding.is_finite() {
            return Err(PersistenceError::NonFinite);
        }

        let json = serde_json::to_string(embedding)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let now = timestamp(Utc::now());

        let revision: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO track_embeddings (
                track_id, embedding, dimension, revision, created_at, updated_at
            ) VALUES (?, ?, ?, 1, ?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                embedding = excluded.embedding,
                dimension = excluded.dimension,
                updated_at = excluded.updated_at,
                revision = track_embeddings.revision + 1
            RETURNING revision
            "#,
        )
        .bind(track_id)
        .bind(&json)
        .bind(self.dimension as i64)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(UpsertOutcome::from_revision(revision))
    }

    /// Load the record for `track_id`
    pub async fn get(&self, track_id: &str) -> Result<Option<EmbeddingRecord>, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT track_id, embedding, dimension, revision, created_at, updated_at
            FROM track_embeddings
            WHERE track_id = ?
            "#,
        )
        .bind(track_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_record(&row, self.dimension)).transpose()
    }

    pub async fn exists(&self, track_id: &str) -> Result<bool, PersistenceError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM track_embeddings WHERE track_id = ?")
                .bind(track_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    pub async fn count(&self) -> Result<i64, PersistenceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM track_embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Track ids from `track_ids` that have no embedding yet
    ///
    /// Keeps input order and drops duplicates.
    pub async fn missing(&self, track_ids: &[String]) -> Result<Vec<String>, PersistenceError> {
        let mut present: HashSet<String> = HashSet::new();

        for chunk in track_ids.chunks(MAX_IDS_PER_QUERY) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT track_id FROM track_embeddings WHERE track_id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");

            let rows: Vec<String> = builder
                .build_query_scalar::<String>()
                .fetch_all(&self.pool)
                .await?;
            present.extend(rows);
        }

        let mut seen = HashSet::new();
        Ok(track_ids
            .iter()
            .filter(|id| !present.contains(*id) && seen.insert(id.as_str()))
            .cloned()
            .collect())
    }

    /// Every stored record, ordered by track id
    pub async fn all(&self) -> Result<Vec<EmbeddingRecord>, PersistenceError> {
        let rows = sqlx::query(
            r#"
            SELECT track_id, embedding, dimension, revision, created_at, updated_at
            FROM track_embeddings
            ORDER BY track_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_record(row, self.dimension)).collect()
    }

    /// Remove the record for `track_id`; returns whether one existed
    pub async fn delete(&self, track_id: &str) -> Result<bool, PersistenceError> {
        let result = sqlx::query("DELETE FROM track_embeddings WHERE track_id = ?")
            .bind(track_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Map a row, rejecting vectors whose length disagrees with the stored
/// `dimension` column or with the repository's dimension
fn row_to_record(row: &SqliteRow, expected: usize) -> Result<EmbeddingRecord, PersistenceError> {
    let track_id: String = row.try_get("track_id")?;
    let embedding_json: String = row.try_get("embedding")?;
    let stored_dimension: i64 = row.try_get("dimension")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let corrupt = |reason: String| PersistenceError::CorruptRecord {
        track_id: track_id.clone(),
        reason,
    };

    let embedding: EmbeddingVector =
        serde_json::from_str(&embedding_json).map_err(|e| corrupt(e.to_string()))?;
    if embedding.dimension() as i64 != stored_dimension {
        return Err(corrupt(format!(
            "vector has {} values but dimension column says {}",
            embedding.dimension(),
            stored_dimension
        )));
    }
    if embedding.dimension() != expected {
        return Err(corrupt(format!(
            "stored dimension {} does not match configured dimension {}",
            embedding.dimension(),
            expected
        )));
    }
    let created_at = parse_timestamp(&created_at).map_err(&corrupt)?;
    let updated_at = parse_timestamp(&updated_at).map_err(&corrupt)?;

    Ok(EmbeddingRecord {
        track_id: track_id.clone(),
        embedding,
        revision: row.try_get("revision")?,
        created_at,
        updated_at,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {:?}: {}", value, e))
}

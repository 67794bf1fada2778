
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::database::Collection;

pub struct CollectionQueries;

impl CollectionQueries {
    /// Register a collection; an existing row with the same name is left untouched
    #[inline]
    pub async fn create(pool: &SqlitePool, collection: &Collection) -> Result<CollectionRecord> {
        let now = Utc::now().naive_utc();
        let dimension = i64::try_from(collection.dimension).context("Dimension out of range")?;

        sqlx::query(
            "INSERT OR IGNORE INTO collections (name, dimension, metric, created_date) VALUES (?, ?, ?, ?)",
        )
        .bind(&collection.name)
        .bind(dimension)
        .bind(collection.metric)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to register collection")?;

        Self::get_by_name(pool, &collection.name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve registered collection"))
    }

    #[inline]
    pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<CollectionRecord>> {
        let result = sqlx::query_as::<_, CollectionRecord>(
            "SELECT name, dimension, metric, created_date FROM collections WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get collection by name")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<CollectionRecord>> {
        let collections = sqlx::query_as::<_, CollectionRecord>(
            "SELECT name, dimension, metric, created_date FROM collections ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list collections")?;

        Ok(collections)
    }
}

pub struct IngestRunQueries;

const INGEST_RUN_COLUMNS: &str = "id, collection, status, fetched, embedded, skipped, upserted, error_message, started_date, finished_date";

impl IngestRunQueries {
    #[inline]
    pub async fn start(pool: &SqlitePool, collection: &str) -> Result<IngestRun> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO ingest_runs (collection, status, started_date) VALUES (?, 'running', ?)",
        )
        .bind(collection)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record ingestion run start")?
        .last_insert_rowid();

        debug!("Started ingestion run {} for {}", id, collection);

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created ingestion run"))
    }

    #[inline]
    pub async fn finish(
        pool: &SqlitePool,
        id: i64,
        status: IngestStatus,
        counts: IngestCounts,
        error_message: Option<&str>,
    ) -> Result<Option<IngestRun>> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            UPDATE ingest_runs
            SET status = ?, fetched = ?, embedded = ?, skipped = ?, upserted = ?,
                error_message = ?, finished_date = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(counts.fetched)
        .bind(counts.embedded)
        .bind(counts.skipped)
        .bind(counts.upserted)
        .bind(error_message)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to record ingestion run result")?;

        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<IngestRun>> {
        let query = format!("SELECT {INGEST_RUN_COLUMNS} FROM ingest_runs WHERE id = ?");
        let result = sqlx::query_as::<_, IngestRun>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get ingestion run by id")?;

        Ok(result)
    }

    /// Most recent runs first
    #[inline]
    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<IngestRun>> {
        let query = format!(
            "SELECT {INGEST_RUN_COLUMNS} FROM ingest_runs ORDER BY started_date DESC, id DESC LIMIT ?"
        );
        let runs = sqlx::query_as::<_, IngestRun>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
            .context("Failed to list ingestion runs")?;

        Ok(runs)
    }

    /// Runs left in `running` by a process that died are marked failed
    #[inline]
    pub async fn fail_abandoned(pool: &SqlitePool, collection: &str) -> Result<u64> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE ingest_runs
            SET status = 'failed', error_message = 'abandoned', finished_date = ?
            WHERE collection = ? AND status = 'running'
            "#,
        )
        .bind(now)
        .bind(collection)
        .execute(pool)
        .await
        .context("Failed to mark abandoned ingestion runs")?;

        Ok(result.rows_affected())
    }
}

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::Collection;
use crate::database::sqlite::models::{CollectionRecord, IngestCounts, IngestRun, IngestStatus};
use crate::database::sqlite::queries::{CollectionQueries, IngestRunQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Metadata database: collection registry and ingestion history
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        if let Some(parent) = database_path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Close every pooled connection; called on shutdown
    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // Collection registry
    #[inline]
    pub async fn get_collection(&self, name: &str) -> Result<Option<CollectionRecord>> {
        CollectionQueries::get_by_name(&self.pool, name).await
    }

    #[inline]
    pub async fn register_collection(&self, collection: &Collection) -> Result<CollectionRecord> {
        CollectionQueries::create(&self.pool, collection).await
    }

    #[inline]
    pub async fn list_collections(&self) -> Result<Vec<CollectionRecord>> {
        CollectionQueries::list_all(&self.pool).await
    }

    // Ingestion history
    #[inline]
    pub async fn start_ingest_run(&self, collection: &str) -> Result<IngestRun> {
        IngestRunQueries::start(&self.pool, collection).await
    }

    #[inline]
    pub async fn finish_ingest_run(
        &self,
        id: i64,
        status: IngestStatus,
        counts: IngestCounts,
        error_message: Option<&str>,
    ) -> Result<Option<IngestRun>> {
        IngestRunQueries::finish(&self.pool, id, status, counts, error_message).await
    }

    #[inline]
    pub async fn recent_ingest_runs(&self, limit: i64) -> Result<Vec<IngestRun>> {
        IngestRunQueries::list_recent(&self.pool, limit).await
    }

    #[inline]
    pub async fn fail_abandoned_runs(&self, collection: &str) -> Result<u64> {
        IngestRunQueries::fail_abandoned(&self.pool, collection).await
    }
}

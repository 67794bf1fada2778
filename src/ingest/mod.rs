// Ingestion module
// Pull the feed, embed the articles, upsert them into the collection


pub mod feed;
pub mod snapshot;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::sqlite::models::{IngestCounts, IngestStatus};
use crate::database::{Database, DistanceMetric, VectorIndex};
use crate::documents::{Document, EmbeddedDocument};
use crate::embeddings::Embedder;
use crate::{RagError, Result};

pub use feed::{FeedSource, JsonFeedSource, parse_feed};
pub use snapshot::{ImportReport, SnapshotRecord, export_snapshot, import_snapshot};

/// Outcome of one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub fetched: usize,
    pub embedded: usize,
    pub skipped: usize,
    pub upserted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestReport {
    #[inline]
    fn counts(&self) -> IngestCounts {
        let as_i64 = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        IngestCounts {
            fetched: as_i64(self.fetched),
            embedded: as_i64(self.embedded),
            skipped: as_i64(self.skipped),
            upserted: as_i64(self.upserted),
        }
    }
}

/// Exclusive lock file, removed when dropped
#[derive(Debug)]
pub struct IngestLock {
    path: PathBuf,
}

impl IngestLock {
    /// Create the lock file, reclaiming it if it is older than `stale_after`
    #[inline]
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    // Best effort, the lock is the file's existence
                    let _ = writeln!(file, "{} {}", std::process::id(), Utc::now().to_rfc3339());
                    debug!("Acquired ingest lock {:?}", path);
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !Self::is_stale(path, stale_after) {
                        return Err(RagError::IngestionInProgress);
                    }
                    warn!("Reclaiming stale ingest lock {:?}", path);
                    std::fs::remove_file(path)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RagError::IngestionInProgress)
    }

    /// Refresh the lock file's modification time so it is not taken for stale
    #[inline]
    pub fn touch(&self) -> Result<()> {
        OpenOptions::new()
            .write(true)
            .open(&self.path)?
            .set_modified(SystemTime::now())?;
        Ok(())
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > stale_after)
    }
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove ingest lock {:?}: {}", self.path, e);
        }
    }
}

/// Feed to collection pipeline; at most one run at a time
pub struct Ingestor {
    feed: Arc<dyn FeedSource>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    history: Option<Database>,
    collection: String,
    metric: DistanceMetric,
    batch_size: usize,
    lock_file: Option<(PathBuf, Duration)>,
    running: Mutex<()>,
}

impl Ingestor {
    #[inline]
    pub fn new(
        config: &Config,
        feed: Arc<dyn FeedSource>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            feed,
            embedder,
            index,
            history: None,
            collection: config.vector_store.collection.clone(),
            metric: config.vector_store.metric,
            batch_size: config.ingest.batch_size.max(1),
            lock_file: None,
            running: Mutex::new(()),
        }
    }

    /// Record every run in the metadata database
    #[inline]
    pub fn with_history(mut self, database: Database) -> Self {
        self.history = Some(database);
        self
    }

    /// Also hold a lock file so separate processes do not ingest concurrently
    #[inline]
    pub fn with_lock_file(mut self, path: PathBuf, stale_after: Duration) -> Self {
        self.lock_file = Some((path, stale_after));
        self
    }

    /// Run one ingestion pass
    #[inline]
    pub async fn run(&self) -> Result<IngestReport> {
        self.run_inner(None).await
    }

    /// Run one ingestion pass, then write the collection to a snapshot file
    #[inline]
    pub async fn run_with_snapshot(&self, path: &Path) -> Result<IngestReport> {
        self.run_inner(Some(path)).await
    }

    async fn run_inner(&self, snapshot: Option<&Path>) -> Result<IngestReport> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| RagError::IngestionInProgress)?;
        let lock = match &self.lock_file {
            Some((path, stale_after)) => Some(IngestLock::acquire(path, *stale_after)?),
            None => None,
        };

        let mut report = IngestReport {
            started_at: Some(Utc::now()),
            ..IngestReport::default()
        };
        info!("Starting ingestion into '{}'", self.collection);

        self.index
            .ensure_collection(&self.collection, self.embedder.dimension(), self.metric)
            .await?;

        let run_id = self.start_history().await;
        let outcome = self.ingest(&mut report, lock.as_ref()).await;
        report.finished_at = Some(Utc::now());

        if let Err(e) = outcome {
            error!(
                "Ingestion failed after upserting {} articles: {}",
                report.upserted, e
            );
            let message = e.to_string();
            self.finish_history(run_id, IngestStatus::Failed, &report, Some(&message))
                .await;
            return Err(e);
        }

        info!(
            "Ingestion finished: fetched {}, embedded {}, skipped {}, upserted {}",
            report.fetched, report.embedded, report.skipped, report.upserted
        );

        // Snapshot failures are noted on the completed run
        let snapshot_error = match snapshot {
            Some(path) => {
                snapshot::export_snapshot(self.index.as_ref(), &self.collection, path)
                    .await
                    .err()
            }
            None => None,
        };
        let note = snapshot_error
            .as_ref()
            .map(|e| format!("Snapshot not written: {}", e));
        self.finish_history(run_id, IngestStatus::Completed, &report, note.as_deref())
            .await;

        match snapshot_error {
            Some(e) => {
                error!("{}", e);
                Err(e)
            }
            None => Ok(report),
        }
    }

    /// Fill `report` as batches complete, so a failed run still reports partial counts
    async fn ingest(&self, report: &mut IngestReport, lock: Option<&IngestLock>) -> Result<()> {
        let documents = self.feed.fetch().await?;
        report.fetched = documents.len();

        let (documents, blank): (Vec<Document>, Vec<Document>) = documents
            .into_iter()
            .partition(|doc| !doc.content.trim().is_empty());
        for doc in &blank {
            debug!("Skipping article {:?} with empty content", doc.title);
        }
        report.skipped += blank.len();

        for batch in documents.chunks(self.batch_size) {
            let (embedded, failed) = self.embed_batch(batch).await;
            report.embedded += embedded.len();
            report.skipped += failed;

            if !embedded.is_empty() {
                report.upserted += self.index.upsert(&self.collection, embedded).await?;
            }
            if let Some(lock) = lock {
                if let Err(e) = lock.touch() {
                    warn!("Failed to refresh ingest lock: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Embed one batch, falling back to item-by-item embedding when the batch call fails
    async fn embed_batch(&self, batch: &[Document]) -> (Vec<EmbeddedDocument>, usize) {
        let texts: Vec<String> = batch.iter().map(|doc| doc.content.clone()).collect();

        match self.embedder.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                return (
                    batch
                        .iter()
                        .cloned()
                        .zip(vectors)
                        .map(|(doc, vector)| doc.with_embedding(vector))
                        .collect(),
                    0,
                );
            }
            Ok(vectors) => warn!(
                "Embedder returned {} vectors for {} articles, retrying one by one",
                vectors.len(),
                batch.len()
            ),
            Err(e) => warn!("Batch embedding failed ({}), retrying one by one", e),
        }

        let mut embedded = Vec::with_capacity(batch.len());
        let mut failed = 0;
        for doc in batch {
            match self.embedder.embed(&doc.content).await {
                Ok(vector) => embedded.push(doc.clone().with_embedding(vector)),
                Err(e) => {
                    warn!("Skipping article {:?}: {}", doc.title, e);
                    failed += 1;
                }
            }
        }
        (embedded, failed)
    }

    async fn start_history(&self) -> Option<i64> {
        let database = self.history.as_ref()?;

        if let Err(e) = database.fail_abandoned_runs(&self.collection).await {
            warn!("Failed to close abandoned ingest runs: {:#}", e);
        }
        match database.start_ingest_run(&self.collection).await {
            Ok(run) => Some(run.id),
            Err(e) => {
                warn!("Failed to record ingest run start: {:#}", e);
                None
            }
        }
    }

    async fn finish_history(
        &self,
        run_id: Option<i64>,
        status: IngestStatus,
        report: &IngestReport,
        error_message: Option<&str>,
    ) {
        let (Some(database), Some(id)) = (self.history.as_ref(), run_id) else {
            return;
        };
        if let Err(e) = database
            .finish_ingest_run(id, status, report.counts(), error_message)
            .await
        {
            warn!("Failed to record ingest run result: {:#}", e);
        }
    }
}

/// Call [`Ingestor::run`] every `interval` until the task is aborted
#[inline]
pub fn spawn_scheduler(ingestor: Arc<Ingestor>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Scheduled ingestion every {:?}", interval);

        loop {
            ticker.tick().await;
            match ingestor.run().await {
                Ok(report) => debug!("Scheduled ingestion upserted {}", report.upserted),
                Err(RagError::IngestionInProgress) => {
                    info!("Skipping scheduled ingestion, another run is in progress");
                }
                Err(e) if e.is_retryable() => {
                    warn!("Scheduled ingestion failed, retrying next tick: {}", e);
                }
                Err(e) => error!("Scheduled ingestion failed: {}", e),
            }
        }
    })
}

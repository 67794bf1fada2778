// Application wiring
// Builds the shared components from a loaded configuration

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{Database, LanceVectorIndex, VectorIndex};
use crate::embeddings::{Embedder, OllamaClient};
use crate::ingest::{FeedSource, Ingestor, JsonFeedSource};
use crate::rag::{GeminiClient, Generator, QueryOrchestrator};
use crate::server::AppState;
use crate::{RagError, Result};

/// Long-lived components shared by the CLI commands and the HTTP server
pub struct App {
    config: Config,
    database: Database,
    embedder: Arc<dyn Embedder>,
    index: Arc<LanceVectorIndex>,
}

impl App {
    /// Open storage and connect the Ollama embedder described by `config`
    #[inline]
    pub async fn open(config: Config) -> Result<Self> {
        let embedder = OllamaClient::new(&config.embedding)?;
        Self::with_embedder(config, Arc::new(embedder)).await
    }

    /// Open storage with a caller-supplied embedder
    #[inline]
    pub async fn with_embedder(config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let configured = config.embedding.dimension as usize;
        if embedder.dimension() != configured {
            return Err(RagError::Config(format!(
                "Embedder produces {} dimensions but embedding.dimension is {}",
                embedder.dimension(),
                configured
            )));
        }

        debug!("Opening metadata database at {:?}", config.database_path());
        let database = Database::new(config.database_path())
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;

        let index = LanceVectorIndex::from_config(&config, database.clone()).await?;
        index
            .ensure_collection(
                &config.vector_store.collection,
                configured,
                config.vector_store.metric,
            )
            .await?;

        info!(
            "Opened collection '{}' under {:?}",
            config.vector_store.collection,
            config.get_base_dir()
        );
        Ok(Self {
            config,
            database,
            embedder,
            index: Arc::new(index),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn index(&self) -> Arc<LanceVectorIndex> {
        Arc::clone(&self.index)
    }

    #[inline]
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    #[inline]
    pub fn generator(&self) -> Result<Arc<dyn Generator>> {
        Ok(Arc::new(GeminiClient::new(&self.config.generation)?))
    }

    #[inline]
    pub fn orchestrator(&self) -> Result<QueryOrchestrator> {
        Ok(self.orchestrator_with(self.generator()?))
    }

    #[inline]
    pub fn orchestrator_with(&self, generator: Arc<dyn Generator>) -> QueryOrchestrator {
        QueryOrchestrator::new(&self.config, self.embedder(), self.index_handle(), generator)
    }

    /// Ingestor reading the configured feed source
    #[inline]
    pub fn ingestor(&self) -> Result<Ingestor> {
        let feed = JsonFeedSource::from_config(&self.config)?;
        Ok(self.ingestor_with(Arc::new(feed)))
    }

    /// Ingestor with run history and the cross-process lock file
    #[inline]
    pub fn ingestor_with(&self, feed: Arc<dyn FeedSource>) -> Ingestor {
        Ingestor::new(&self.config, feed, self.embedder(), self.index_handle())
            .with_history(self.database.clone())
            .with_lock_file(
                self.config.ingest_lock_path(),
                Duration::from_secs(self.config.ingest.stale_lock_secs),
            )
    }

    /// State for the HTTP API; ingestion is disabled when no feed is configured
    #[inline]
    pub fn server_state(&self, generator: Arc<dyn Generator>) -> Result<Arc<AppState>> {
        let ingestor = match self.config.feed.source {
            Some(_) => Some(Arc::new(self.ingestor()?)),
            None => {
                info!("No feed source configured, POST /api/ingest is disabled");
                None
            }
        };

        Ok(Arc::new(AppState {
            orchestrator: self.orchestrator_with(generator),
            ingestor,
        }))
    }

    /// Close the metadata database
    #[inline]
    pub async fn shutdown(&self) {
        self.database.close().await;
    }

    fn index_handle(&self) -> Arc<dyn VectorIndex> {
        Arc::clone(&self.index) as Arc<dyn VectorIndex>
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error(
        "Collection '{collection}' already exists with dimension {existing_dimension} and metric {existing_metric}, requested dimension {requested_dimension} and metric {requested_metric}"
    )]
    SchemaConflict {
        collection: String,
        existing_dimension: usize,
        existing_metric: database::DistanceMetric,
        requested_dimension: usize,
        requested_metric: database::DistanceMetric,
    },

    #[error(
        "Embedding for '{id}' has {actual} dimensions but collection '{collection}' expects {expected}"
    )]
    DimensionMismatch {
        collection: String,
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] Box<RagError>),

    #[error("Another ingestion run is already in progress")]
    IngestionInProgress,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Whether retrying the same call later could succeed
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::IndexUnavailable(_)
            | Self::Generation(_)
            | Self::IngestionInProgress
            | Self::Feed(_) => true,
            Self::Retrieval(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}

pub mod app;
pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod http;
pub mod ingest;
pub mod rag;
pub mod server;

#[cfg(test)]
mod test_support;

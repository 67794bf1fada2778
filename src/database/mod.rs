// Database module
// SQLite holds the collection registry and ingestion history, LanceDB holds the vectors

pub mod lancedb;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::documents::{Document, EmbeddedDocument};

pub use self::lancedb::LanceVectorIndex;
pub use sqlite::Database;

/// Distance metric a collection is searched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclidean,
}

impl std::fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Dot => write!(f, "dot"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    #[inline]
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

impl DistanceMetric {
    /// Convert a raw distance reported by the store into a similarity, higher is better.
    ///
    /// Cosine and dot distances are `1 - similarity`; squared euclidean
    /// distance is mapped into `(0, 1]`.
    #[inline]
    pub fn similarity_from_distance(self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine | DistanceMetric::Dot => 1.0 - distance,
            DistanceMetric::Euclidean => 1.0 / (1.0 + distance.max(0.0)),
        }
    }
}

/// A named, schema-fixed set of embedded documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

/// A retrieved document with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
}

/// Storage for embedded documents with top-k similarity search.
///
/// Implementations are shared across concurrent requests.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection, or verify an existing one has the same dimension and metric.
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<Collection>;

    /// Look up a collection's schema
    async fn collection(&self, name: &str) -> Result<Option<Collection>>;

    /// Insert or replace documents by id; a batch with any wrongly sized embedding writes nothing.
    async fn upsert(&self, collection: &str, items: Vec<EmbeddedDocument>) -> Result<usize>;

    /// The `top_k` most similar documents, highest score first, ties in insertion order.
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    /// Every stored document with its embedding, in insertion order
    async fn documents(&self, collection: &str) -> Result<Vec<EmbeddedDocument>>;
}

/// Reject any item whose embedding length differs from the collection dimension
#[inline]
pub fn validate_batch(collection: &Collection, items: &[EmbeddedDocument]) -> Result<()> {
    if let Some(bad) = items
        .iter()
        .find(|item| item.dimension() != collection.dimension)
    {
        return Err(crate::RagError::DimensionMismatch {
            collection: collection.name.clone(),
            id: bad.id().to_string(),
            expected: collection.dimension,
            actual: bad.dimension(),
        });
    }
    Ok(())
}

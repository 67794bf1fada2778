//! Article records flowing through ingestion, the vector index and retrieval.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A news article as stored in the vector index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from the link, see [`document_id`]
    pub id: String,
    pub title: String,
    pub link: String,
    pub content: String,
}

/// A document together with its embedding vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedDocument {
    #[serde(flatten)]
    pub document: Document,
    pub embedding: Vec<f32>,
}

impl Document {
    /// Build a document whose id is derived from its link (or content when the link is empty)
    #[inline]
    pub fn new(title: impl Into<String>, link: impl Into<String>, content: impl Into<String>) -> Self {
        let link = link.into();
        let content = content.into();
        Self {
            id: document_id(&link, &content),
            title: title.into(),
            link,
            content,
        }
    }

    #[inline]
    pub fn with_embedding(self, embedding: Vec<f32>) -> EmbeddedDocument {
        EmbeddedDocument {
            document: self,
            embedding,
        }
    }
}

impl EmbeddedDocument {
    #[inline]
    pub fn id(&self) -> &str {
        &self.document.id
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// Deterministic document id.
///
/// Articles are keyed by UUIDv5 of their link so re-ingesting the same feed
/// replaces rows instead of duplicating them. Items without a link fall back
/// to a UUIDv5 of their content.
#[inline]
pub fn document_id(link: &str, content: &str) -> String {
    let link = link.trim();
    if link.is_empty() {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string()
    } else {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, link.as_bytes()).to_string()
    }
}

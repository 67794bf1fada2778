
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::database::VectorIndex;
use crate::documents::{Document, EmbeddedDocument};
use crate::{RagError, Result};

/// One snapshot entry; `id` is recomputed from the link when absent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub content: String,
    pub embedding: Vec<f32>,
}

impl From<EmbeddedDocument> for SnapshotRecord {
    #[inline]
    fn from(item: EmbeddedDocument) -> Self {
        Self {
            id: Some(item.document.id),
            title: item.document.title,
            link: item.document.link,
            content: item.document.content,
            embedding: item.embedding,
        }
    }
}

impl SnapshotRecord {
    #[inline]
    pub fn into_embedded(self) -> EmbeddedDocument {
        let mut document = Document::new(self.title, self.link, self.content);
        if let Some(id) = self.id.filter(|id| !id.trim().is_empty()) {
            document.id = id;
        }
        document.with_embedding(self.embedding)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub read: usize,
    pub skipped: usize,
    pub upserted: usize,
}

/// Write embedded documents as a pretty-printed JSON array
#[inline]
pub async fn write_snapshot(path: &Path, items: Vec<EmbeddedDocument>) -> Result<usize> {
    let count = items.len();
    let records: Vec<SnapshotRecord> = items.into_iter().map(SnapshotRecord::from).collect();
    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| RagError::Snapshot(format!("Failed to serialize snapshot: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await.map_err(|e| {
        RagError::Snapshot(format!("Failed to write snapshot {:?}: {}", path, e))
    })?;

    info!("Wrote {} documents to snapshot {:?}", count, path);
    Ok(count)
}

#[inline]
pub async fn read_snapshot(path: &Path) -> Result<Vec<SnapshotRecord>> {
    let body = tokio::fs::read_to_string(path).await.map_err(|e| {
        RagError::Snapshot(format!("Failed to read snapshot {:?}: {}", path, e))
    })?;
    serde_json::from_str(&body)
        .map_err(|e| RagError::Snapshot(format!("Invalid snapshot {:?}: {}", path, e)))
}

/// Dump every document of `collection` to `path`
#[inline]
pub async fn export_snapshot(index: &dyn VectorIndex, collection: &str, path: &Path) -> Result<usize> {
    let items = index.documents(collection).await?;
    write_snapshot(path, items).await
}

/// Load a snapshot into `collection` without re-embedding.
///
/// Records whose embedding does not match the collection dimension or whose
/// content is blank are skipped with a warning.
#[inline]
pub async fn import_snapshot(
    index: &dyn VectorIndex,
    collection: &str,
    path: &Path,
    batch_size: usize,
) -> Result<ImportReport> {
    let schema = index
        .collection(collection)
        .await?
        .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

    let records = read_snapshot(path).await?;
    let mut report = ImportReport {
        read: records.len(),
        ..ImportReport::default()
    };

    let mut accepted = Vec::with_capacity(records.len());
    for record in records {
        if record.content.trim().is_empty() {
            warn!("Skipping snapshot record {:?} with empty content", record.title);
            report.skipped += 1;
        } else if record.embedding.len() != schema.dimension {
            warn!(
                "Skipping snapshot record {:?}: {} dimensions, collection expects {}",
                record.title,
                record.embedding.len(),
                schema.dimension
            );
            report.skipped += 1;
        } else {
            accepted.push(record.into_embedded());
        }
    }

    for batch in accepted.chunks(batch_size.max(1)) {
        report.upserted += index.upsert(collection, batch.to_vec()).await?;
    }

    info!(
        "Imported {} of {} snapshot records into '{}'",
        report.upserted, report.read, collection
    );
    Ok(report)
}

#[cfg(test)]
mod tests;

use super::{
    CONTENT_COLUMN, DISTANCE_COLUMN, ID_COLUMN, INGESTED_AT_COLUMN, LINK_COLUMN, SEQUENCE_COLUMN,
    TITLE_COLUMN, VECTOR_COLUMN, collection_schema, schema_dimension,
};
use crate::config::Config;
use crate::config::settings::is_valid_collection_name;
use crate::database::{Collection, Database, DistanceMetric, SearchResult, VectorIndex, validate_batch};
use crate::documents::{Document, EmbeddedDocument};
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Extra candidates fetched beyond `top_k`; the window doubles while the
/// last candidate still ties with the k-th result.
const TIE_WINDOW: usize = 8;

/// LanceDB-backed [`VectorIndex`]
pub struct LanceVectorIndex {
    connection: Connection,
    database: Database,
    timeout: Duration,
    collections: RwLock<HashMap<String, Collection>>,
    schema_lock: Mutex<()>,
    sequence: AtomicI64,
}

/// A row read back from a collection table
#[derive(Debug, Clone)]
struct StoredRow {
    document: Document,
    sequence: i64,
    distance: Option<f32>,
    vector: Option<Vec<f32>>,
}

impl LanceVectorIndex {
    /// Connect to (or create) the LanceDB directory at `path`
    #[inline]
    pub async fn open(path: &Path, database: Database, timeout: Duration) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", path);

        std::fs::create_dir_all(path).map_err(|e| {
            RagError::IndexUnavailable(format!(
                "Failed to create vector database directory: {}",
                e
            ))
        })?;

        let uri = path.to_string_lossy().into_owned();
        let connection = match tokio::time::timeout(timeout, lancedb::connect(&uri).execute())
            .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                return Err(RagError::IndexUnavailable(format!(
                    "Failed to connect to LanceDB: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(RagError::IndexUnavailable(format!(
                    "Timed out connecting to LanceDB after {:?}",
                    timeout
                )));
            }
        };

        info!("Vector index opened at {:?}", path);
        Ok(Self {
            connection,
            database,
            timeout,
            collections: RwLock::new(HashMap::new()),
            schema_lock: Mutex::new(()),
            sequence: AtomicI64::new(0),
        })
    }

    #[inline]
    pub async fn from_config(config: &Config, database: Database) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            database,
            Duration::from_secs(config.vector_store.timeout_secs),
        )
        .await
    }

    /// Await a store call, mapping failures and timeouts to [`RagError::IndexUnavailable`]
    async fn bounded<T, E, F>(&self, operation: &str, future: F) -> Result<T>
    where
        E: std::fmt::Display,
        F: Future<Output = std::result::Result<T, E>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RagError::IndexUnavailable(format!(
                "Failed to {}: {}",
                operation, e
            ))),
            Err(_) => Err(RagError::IndexUnavailable(format!(
                "Timed out after {:?} trying to {}",
                self.timeout, operation
            ))),
        }
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let table_names = self
            .bounded("list tables", self.connection.table_names().execute())
            .await?;
        Ok(table_names.iter().any(|table| table == name))
    }

    async fn open_table(&self, name: &str) -> Result<Table> {
        self.bounded("open table", self.connection.open_table(name).execute())
            .await
    }

    async fn create_table(&self, collection: &Collection) -> Result<()> {
        info!(
            "Creating collection table '{}' with {} dimensions",
            collection.name, collection.dimension
        );
        self.bounded(
            "create table",
            self.connection
                .create_empty_table(&collection.name, collection_schema(collection.dimension))
                .execute(),
        )
        .await?;
        Ok(())
    }

    /// Vector dimension of an existing table, read from its schema
    async fn detect_existing_dimension(&self, name: &str) -> Result<usize> {
        let table = self.open_table(name).await?;
        let schema = self.bounded("read table schema", table.schema()).await?;

        schema_dimension(&schema).ok_or_else(|| {
            RagError::IndexUnavailable(format!(
                "Table '{}' has no fixed-size vector column",
                name
            ))
        })
    }

    /// Registered schema for `name`, from the cache or the registry
    async fn resolve_collection(&self, name: &str) -> Result<Collection> {
        if let Some(collection) = self.collections.read().await.get(name) {
            return Ok(collection.clone());
        }

        let record = self
            .database
            .get_collection(name)
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        let collection = record.to_collection();
        self.collections
            .write()
            .await
            .insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Reserve `count` consecutive insertion sequence numbers
    fn reserve_sequence(&self, count: usize) -> i64 {
        let count = i64::try_from(count).unwrap_or(i64::MAX / 2);
        let now = Utc::now().timestamp_micros();
        let mut current = self.sequence.load(Ordering::Acquire);
        loop {
            let start = now.max(current);
            match self.sequence.compare_exchange(
                current,
                start + count,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return start,
                Err(actual) => current = actual,
            }
        }
    }

    /// Insertion sequence already stored for each of `ids` that exists
    async fn existing_sequences(&self, table: &Table, ids: &[&str]) -> Result<HashMap<String, i64>> {
        let quoted = ids
            .iter()
            .map(|id| format!("'{}'", id.replace('\'', "''")))
            .collect::<Vec<_>>();
        let filter = format!("{} IN ({})", ID_COLUMN, quoted.join(", "));

        let query = table
            .query()
            .only_if(filter)
            .select(Select::columns(&[ID_COLUMN, SEQUENCE_COLUMN]))
            .limit(ids.len());
        let batches = self.collect_batches("read existing sequences", query).await?;

        let mut sequences = HashMap::with_capacity(ids.len());
        for batch in &batches {
            let stored_ids = string_column(batch, ID_COLUMN)?;
            let stored_sequences = batch
                .column_by_name(SEQUENCE_COLUMN)
                .and_then(|column| column.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| missing_column(SEQUENCE_COLUMN))?;
            for row in 0..batch.num_rows() {
                sequences.insert(
                    stored_ids.value(row).to_string(),
                    stored_sequences.value(row),
                );
            }
        }
        Ok(sequences)
    }

    /// Sequence numbers for `items`: stored ids keep theirs, new ids get fresh ones
    async fn assign_sequences(&self, table: &Table, items: &[EmbeddedDocument]) -> Result<Vec<i64>> {
        let ids = items
            .iter()
            .map(|item| item.document.id.as_str())
            .collect::<Vec<_>>();
        let existing = self.existing_sequences(table, &ids).await?;

        let fresh = items
            .iter()
            .filter(|item| !existing.contains_key(&item.document.id))
            .count();
        let mut next = self.reserve_sequence(fresh);

        Ok(items
            .iter()
            .map(|item| match existing.get(&item.document.id) {
                Some(sequence) => *sequence,
                None => {
                    let sequence = next;
                    next += 1;
                    sequence
                }
            })
            .collect())
    }

    /// Build the Arrow batch for a validated, de-duplicated set of items
    fn create_record_batch(
        collection: &Collection,
        items: &[EmbeddedDocument],
        sequences: &[i64],
    ) -> Result<RecordBatch> {
        let len = items.len();
        let ingested_at = Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(len);
        let mut titles = Vec::with_capacity(len);
        let mut links = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * collection.dimension);

        for item in items {
            ids.push(item.document.id.as_str());
            titles.push(item.document.title.as_str());
            links.push(item.document.link.as_str());
            contents.push(item.document.content.as_str());
            flat_values.extend_from_slice(&item.embedding);
        }

        let dimension = i32::try_from(collection.dimension).map_err(|_| {
            RagError::Config(format!("Dimension {} is too large", collection.dimension))
        })?;
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::IndexUnavailable(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(links)),
            Arc::new(StringArray::from(contents)),
            Arc::new(Int64Array::from(sequences.to_vec())),
            Arc::new(StringArray::from(vec![ingested_at.as_str(); len])),
        ];

        RecordBatch::try_new(collection_schema(collection.dimension), arrays)
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to create record batch: {}", e)))
    }

    /// Run a query stream to completion within the timeout
    async fn collect_batches<Q>(&self, operation: &str, query: Q) -> Result<Vec<RecordBatch>>
    where
        Q: ExecutableQuery + Send + Sync,
    {
        self.bounded(operation, async {
            let stream = query.execute().await.map_err(|e| e.to_string())?;
            stream
                .try_collect::<Vec<RecordBatch>>()
                .await
                .map_err(|e| e.to_string())
        })
        .await
    }

    /// The `fetch` nearest rows with their similarity, best first, ties by sequence
    async fn nearest(
        &self,
        table: &Table,
        schema: &Collection,
        query_vector: &[f32],
        fetch: usize,
    ) -> Result<Vec<(StoredRow, f32)>> {
        let query = table
            .vector_search(query_vector)
            .map_err(|e| {
                RagError::IndexUnavailable(format!("Failed to create vector search: {}", e))
            })?
            .column(VECTOR_COLUMN)
            .distance_type(schema.metric.into())
            .limit(fetch);

        let batches = self.collect_batches("execute search", query).await?;

        let mut scored = Vec::new();
        for batch in &batches {
            for row in Self::parse_rows(batch, false)? {
                let score = schema
                    .metric
                    .similarity_from_distance(row.distance.unwrap_or(f32::INFINITY));
                scored.push((row, score));
            }
        }

        scored.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        Ok(scored)
    }

    fn parse_rows(batch: &RecordBatch, with_vectors: bool) -> Result<Vec<StoredRow>> {
        let ids = string_column(batch, ID_COLUMN)?;
        let titles = string_column(batch, TITLE_COLUMN)?;
        let links = string_column(batch, LINK_COLUMN)?;
        let contents = string_column(batch, CONTENT_COLUMN)?;
        let sequences = batch
            .column_by_name(SEQUENCE_COLUMN)
            .and_then(|column| column.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| missing_column(SEQUENCE_COLUMN))?;

        let distances = batch
            .column_by_name(DISTANCE_COLUMN)
            .and_then(|column| column.as_any().downcast_ref::<Float32Array>());

        let vectors = if with_vectors {
            Some(
                batch
                    .column_by_name(VECTOR_COLUMN)
                    .and_then(|column| column.as_any().downcast_ref::<FixedSizeListArray>())
                    .ok_or_else(|| missing_column(VECTOR_COLUMN))?,
            )
        } else {
            None
        };

        let mut rows = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let vector = match vectors {
                Some(list) => {
                    let values = list.value(row);
                    let floats = values
                        .as_any()
                        .downcast_ref::<Float32Array>()
                        .ok_or_else(|| missing_column(VECTOR_COLUMN))?;
                    Some(floats.values().to_vec())
                }
                None => None,
            };

            rows.push(StoredRow {
                document: Document {
                    id: ids.value(row).to_string(),
                    title: titles.value(row).to_string(),
                    link: links.value(row).to_string(),
                    content: contents.value(row).to_string(),
                },
                sequence: sequences.value(row),
                distance: distances.and_then(|d| (!d.is_null(row)).then(|| d.value(row))),
                vector,
            });
        }

        Ok(rows)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| missing_column(name))
}

fn missing_column(name: &str) -> RagError {
    RagError::IndexUnavailable(format!("Missing or invalid column: {}", name))
}

impl From<DistanceMetric> for DistanceType {
    #[inline]
    fn from(metric: DistanceMetric) -> Self {
        match metric {
            DistanceMetric::Cosine => DistanceType::Cosine,
            DistanceMetric::Dot => DistanceType::Dot,
            DistanceMetric::Euclidean => DistanceType::L2,
        }
    }
}

/// Whether a full window of sorted candidates ends on the k-th result's score,
/// so rows with the same score may have been cut off
fn ties_past_window(scored: &[(StoredRow, f32)], top_k: usize, fetch: usize) -> bool {
    if scored.len() < fetch {
        return false;
    }
    match (scored.get(top_k.saturating_sub(1)), scored.last()) {
        (Some((_, kth)), Some((_, last))) => kth.total_cmp(last).is_eq(),
        _ => false,
    }
}

/// Keep the last occurrence of every id, in the order those occurrences appear
fn dedup_last_wins(items: Vec<EmbeddedDocument>) -> Vec<EmbeddedDocument> {
    let mut last_index: HashMap<String, usize> = HashMap::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        last_index.insert(item.document.id.clone(), index);
    }

    items
        .into_iter()
        .enumerate()
        .filter(|(index, item)| last_index.get(&item.document.id) == Some(index))
        .map(|(_, item)| item)
        .collect()
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<Collection> {
        if !is_valid_collection_name(name) {
            return Err(RagError::Config(format!(
                "Invalid collection name: {:?}",
                name
            )));
        }
        if dimension == 0 {
            return Err(RagError::Config(
                "Collection dimension must be positive".to_string(),
            ));
        }

        let requested = Collection {
            name: name.to_string(),
            dimension,
            metric,
        };
        let conflict = |existing: &Collection| RagError::SchemaConflict {
            collection: name.to_string(),
            existing_dimension: existing.dimension,
            existing_metric: existing.metric,
            requested_dimension: dimension,
            requested_metric: metric,
        };

        let _guard = self.schema_lock.lock().await;

        let registered = self
            .database
            .get_collection(name)
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;

        let table_exists = self.table_exists(name).await?;

        if let Some(record) = registered {
            let existing = record.to_collection();
            if existing != requested {
                return Err(conflict(&existing));
            }
            if !table_exists {
                warn!("Collection '{}' registered but its table is missing, recreating", name);
                self.create_table(&existing).await?;
            }
            debug!("Collection '{}' already exists", name);
            self.collections
                .write()
                .await
                .insert(name.to_string(), existing.clone());
            return Ok(existing);
        }

        if table_exists {
            let existing_dimension = self.detect_existing_dimension(name).await?;
            if existing_dimension != dimension {
                return Err(conflict(&Collection {
                    dimension: existing_dimension,
                    ..requested
                }));
            }
            info!(
                "Adopting unregistered table '{}' with {} dimensions",
                name, existing_dimension
            );
        } else {
            self.create_table(&requested).await?;
        }

        let stored = self
            .database
            .register_collection(&requested)
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?
            .to_collection();
        if stored != requested {
            return Err(conflict(&stored));
        }

        self.collections
            .write()
            .await
            .insert(name.to_string(), stored.clone());
        info!(
            "Collection '{}' ready ({} dimensions, {} metric)",
            name, dimension, metric
        );
        Ok(stored)
    }

    async fn collection(&self, name: &str) -> Result<Option<Collection>> {
        match self.resolve_collection(name).await {
            Ok(collection) => Ok(Some(collection)),
            Err(RagError::CollectionNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn upsert(&self, collection: &str, items: Vec<EmbeddedDocument>) -> Result<usize> {
        if items.is_empty() {
            debug!("No documents to upsert");
            return Ok(0);
        }

        let schema = self.resolve_collection(collection).await?;
        validate_batch(&schema, &items)?;

        let items = dedup_last_wins(items);
        let table = self.open_table(collection).await?;
        let sequences = self.assign_sequences(&table, &items).await?;
        let record_batch = Self::create_record_batch(&schema, &items, &sequences)?;

        let batch_schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), batch_schema);

        let mut merge = table.merge_insert(&[ID_COLUMN]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        self.bounded("upsert documents", merge.execute(Box::new(reader)))
            .await?;

        info!("Upserted {} documents into '{}'", items.len(), collection);
        Ok(items.len())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let schema = self.resolve_collection(collection).await?;
        if query_vector.len() != schema.dimension {
            return Err(RagError::DimensionMismatch {
                collection: collection.to_string(),
                id: "<query>".to_string(),
                expected: schema.dimension,
                actual: query_vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let table = self.open_table(collection).await?;
        let rows = self.bounded("count rows", table.count_rows(None)).await?;
        if rows == 0 {
            debug!("Collection '{}' is empty", collection);
            return Ok(Vec::new());
        }

        let mut fetch = top_k.saturating_add(TIE_WINDOW).min(rows);
        let mut scored = loop {
            debug!(
                "Searching '{}' for {} nearest of {} documents",
                collection, fetch, rows
            );
            let scored = self.nearest(&table, &schema, query_vector, fetch).await?;
            if fetch >= rows || !ties_past_window(&scored, top_k, fetch) {
                break scored;
            }
            fetch = fetch.saturating_mul(2).min(rows);
        };
        scored.truncate(top_k);

        debug!("Search returned {} results", scored.len());
        Ok(scored
            .into_iter()
            .map(|(row, score)| SearchResult {
                document: row.document,
                score,
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.resolve_collection(collection).await?;
        let table = self.open_table(collection).await?;
        self.bounded("count rows", table.count_rows(None)).await
    }

    async fn documents(&self, collection: &str) -> Result<Vec<EmbeddedDocument>> {
        self.resolve_collection(collection).await?;
        let table = self.open_table(collection).await?;
        let rows = self.bounded("count rows", table.count_rows(None)).await?;
        if rows == 0 {
            return Ok(Vec::new());
        }

        let batches = self
            .collect_batches("scan documents", table.query().limit(rows))
            .await?;

        let mut stored = Vec::with_capacity(rows);
        for batch in &batches {
            stored.extend(Self::parse_rows(batch, true)?);
        }
        stored.sort_by_key(|row| row.sequence);

        Ok(stored
            .into_iter()
            .map(|row| {
                let embedding = row.vector.unwrap_or_default();
                row.document.with_embedding(embedding)
            })
            .collect())
    }
}

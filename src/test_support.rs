// In-memory fakes shared by unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::database::{Collection, DistanceMetric, SearchResult, VectorIndex, validate_batch};
use crate::documents::{Document, EmbeddedDocument};
use crate::embeddings::{Embedder, normalize};
use crate::ingest::FeedSource;
use crate::rag::Generator;
use crate::{RagError, Result};

/// Hashes lowercase words into buckets, so texts sharing words land close together
pub struct BagOfWordsEmbedder {
    pub dimension: usize,
    pub fail_on: Option<String>,
    pub calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(needle) = &self.fail_on {
            if text.contains(needle.as_str()) {
                return Err(RagError::Embedding(format!("refusing to embed {needle:?}")));
            }
        }

        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = (fnv1a(&word.to_lowercase()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

/// Exhaustive cosine search over a `Vec`
#[derive(Default)]
pub struct MemoryIndex {
    collections: Mutex<HashMap<String, (Collection, Vec<EmbeddedDocument>)>>,
    pub fail_search: bool,
    /// Upsert calls allowed before every further upsert fails
    pub upsert_budget: Option<usize>,
    upsert_calls: AtomicUsize,
}

impl MemoryIndex {
    pub fn failing() -> Self {
        Self {
            fail_search: true,
            ..Self::default()
        }
    }

    pub fn failing_upserts_after(calls: usize) -> Self {
        Self {
            upsert_budget: Some(calls),
            ..Self::default()
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<Collection> {
        let mut collections = self.collections.lock().expect("index lock poisoned");
        let requested = Collection {
            name: name.to_string(),
            dimension,
            metric,
        };
        let (existing, _) = collections
            .entry(name.to_string())
            .or_insert_with(|| (requested.clone(), Vec::new()));
        if *existing != requested {
            return Err(RagError::SchemaConflict {
                collection: name.to_string(),
                existing_dimension: existing.dimension,
                existing_metric: existing.metric,
                requested_dimension: dimension,
                requested_metric: metric,
            });
        }
        Ok(existing.clone())
    }

    async fn collection(&self, name: &str) -> Result<Option<Collection>> {
        let collections = self.collections.lock().expect("index lock poisoned");
        Ok(collections.get(name).map(|(c, _)| c.clone()))
    }

    async fn upsert(&self, collection: &str, items: Vec<EmbeddedDocument>) -> Result<usize> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.upsert_budget.is_some_and(|budget| call >= budget) {
            return Err(RagError::IndexUnavailable("upsert disabled".to_string()));
        }
        let mut collections = self.collections.lock().expect("index lock poisoned");
        let (schema, stored) = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        validate_batch(schema, &items)?;

        let written = items.len();
        for item in items {
            if let Some(existing) = stored.iter_mut().find(|d| d.id() == item.id()) {
                *existing = item;
            } else {
                stored.push(item);
            }
        }
        Ok(written)
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if self.fail_search {
            return Err(RagError::IndexUnavailable("search disabled".to_string()));
        }
        let collections = self.collections.lock().expect("index lock poisoned");
        let (_, stored) = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        let mut results = stored
            .iter()
            .map(|d| SearchResult {
                document: d.document.clone(),
                score: cosine(query_vector, &d.embedding),
            })
            .collect::<Vec<_>>();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.lock().expect("index lock poisoned");
        Ok(collections.get(collection).map_or(0, |(_, d)| d.len()))
    }

    async fn documents(&self, collection: &str) -> Result<Vec<EmbeddedDocument>> {
        let collections = self.collections.lock().expect("index lock poisoned");
        Ok(collections
            .get(collection)
            .map(|(_, d)| d.clone())
            .unwrap_or_default())
    }
}

/// Echoes its prompt inputs back and remembers them
#[derive(Default)]
pub struct RecordingGenerator {
    pub calls: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingGenerator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn last_context(&self) -> Option<String> {
        self.calls
            .lock()
            .expect("generator lock poisoned")
            .last()
            .map(|(_, context)| context.clone())
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        if self.fail {
            return Err(RagError::Generation("model offline".to_string()));
        }
        self.calls
            .lock()
            .expect("generator lock poisoned")
            .push((question.to_string(), context.to_string()));
        Ok(format!("answer to {question}"))
    }
}

/// Feed that hands out a fixed list of articles
pub struct StaticFeed(pub Vec<Document>);

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(&self) -> Result<Vec<Document>> {
        Ok(self.0.clone())
    }
}

pub fn article(title: &str, content: &str) -> Document {
    Document::new(
        title,
        format!("https://news.example.com/{}", title.to_lowercase().replace(' ', "-")),
        content,
    )
}

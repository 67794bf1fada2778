
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{ContextBuilder, Generator, RagAnswer, RagQuery};
use crate::config::Config;
use crate::database::{SearchResult, VectorIndex};
use crate::embeddings::Embedder;
use crate::{RagError, Result};

/// Runs one question through embed, search, context and generation.
///
/// Holds only shared read-only handles, so one instance serves any number
/// of concurrent requests.
#[derive(Clone)]
pub struct QueryOrchestrator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    context_builder: ContextBuilder,
    collection: String,
    default_top_k: usize,
    max_top_k: usize,
}

impl QueryOrchestrator {
    #[inline]
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            context_builder: ContextBuilder::from_config(&config.retrieval),
            collection: config.vector_store.collection.clone(),
            default_top_k: config.retrieval.default_top_k,
            max_top_k: config.retrieval.max_top_k,
        }
    }

    /// Check the question and resolve the effective `top_k`
    #[inline]
    pub fn validate(&self, query: &RagQuery) -> Result<usize> {
        if query.question.trim().is_empty() {
            return Err(RagError::InvalidQuery("question must not be empty".to_string()));
        }

        let top_k = query.top_k.unwrap_or(self.default_top_k);
        if top_k == 0 || top_k > self.max_top_k {
            return Err(RagError::InvalidQuery(format!(
                "top_k must be between 1 and {}, got {}",
                self.max_top_k, top_k
            )));
        }
        Ok(top_k)
    }

    /// Articles most similar to the question, best first
    #[inline]
    pub async fn retrieve(&self, query: &RagQuery) -> Result<Vec<SearchResult>> {
        let top_k = self.validate(query)?;
        self.search(&query.question, top_k).await
    }

    /// Answer the question from retrieved context
    #[inline]
    pub async fn answer(&self, query: &RagQuery) -> Result<RagAnswer> {
        let top_k = self.validate(query)?;
        let results = self.search(&query.question, top_k).await?;

        let assembled = self.context_builder.assemble(&results);
        debug!(
            "Context uses {} of {} retrieved articles (truncated: {})",
            assembled.documents.len(),
            results.len(),
            assembled.truncated
        );

        let text = self
            .generator
            .generate(&query.question, &assembled.text)
            .await
            .inspect_err(|e| error!("Generation failed: {}", e))?;

        info!(
            "Answered question with {} context articles",
            assembled.documents.len()
        );
        Ok(RagAnswer {
            text,
            used_context: assembled.documents,
        })
    }

    async fn search(&self, question: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let query_vector = self.embedder.embed(question).await.map_err(|e| {
            error!("Failed to embed question: {}", e);
            RagError::Retrieval(Box::new(e))
        })?;

        let results = self
            .index
            .search(&self.collection, &query_vector, top_k)
            .await
            .map_err(|e| {
                error!("Search in '{}' failed: {}", self.collection, e);
                RagError::Retrieval(Box::new(e))
            })?;

        debug!("Retrieved {} articles for top_k {}", results.len(), top_k);
        Ok(results)
    }
}


use tracing::debug;

use crate::config::RetrievalConfig;
use crate::database::SearchResult;
use crate::documents::Document;

/// Separator placed between article bodies in the assembled context
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Context text handed to the generator plus the articles it was built from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    pub documents: Vec<Document>,
    /// Whether anything was dropped or cut to fit the budget
    pub truncated: bool,
}

/// Joins retrieved articles into a single character-bounded context block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBuilder {
    max_chars: usize,
}

impl ContextBuilder {
    #[inline]
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    #[inline]
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_context_chars)
    }

    /// Context text for `query` from `results`; empty when nothing was retrieved
    #[inline]
    pub fn build(&self, query: &str, results: &[SearchResult]) -> String {
        let assembled = self.assemble(results);
        debug!(
            "Built {} char context from {} of {} results for query {:?}",
            assembled.text.chars().count(),
            assembled.documents.len(),
            results.len(),
            query
        );
        assembled.text
    }

    /// Highest score first (ties keep input order), skipping blank bodies;
    /// documents that no longer fit are dropped, only a lone oversized
    /// first document is cut to the budget.
    #[inline]
    pub fn assemble(&self, results: &[SearchResult]) -> AssembledContext {
        let mut ranked: Vec<&SearchResult> = results
            .iter()
            .filter(|result| !result.document.content.trim().is_empty())
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let delimiter_chars = CONTEXT_DELIMITER.chars().count();
        let mut assembled = AssembledContext::default();
        let mut used_chars = 0;

        for result in ranked.iter() {
            let content = result.document.content.as_str();
            let content_chars = content.chars().count();

            if assembled.documents.is_empty() {
                if content_chars > self.max_chars {
                    assembled.text = content.chars().take(self.max_chars).collect();
                    assembled.documents.push(result.document.clone());
                    assembled.truncated = true;
                    break;
                }
                assembled.text.push_str(content);
                used_chars = content_chars;
            } else {
                let needed = delimiter_chars + content_chars;
                if used_chars + needed > self.max_chars {
                    assembled.truncated = true;
                    break;
                }
                assembled.text.push_str(CONTEXT_DELIMITER);
                assembled.text.push_str(content);
                used_chars += needed;
            }
            assembled.documents.push(result.document.clone());
        }

        if assembled.documents.len() < ranked.len() {
            assembled.truncated = true;
        }
        assembled
    }
}

impl Default for ContextBuilder {
    #[inline]
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

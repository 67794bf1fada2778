// Retrieval-augmented answering
// Embed the question, search the index, build a context block, generate an answer

pub mod context;
pub mod generator;
pub mod orchestrator;

use serde::{Deserialize, Serialize};

use crate::documents::Document;

pub use context::{AssembledContext, CONTEXT_DELIMITER, ContextBuilder};
pub use generator::{GeminiClient, Generator, build_prompt, extract_answer};
pub use orchestrator::QueryOrchestrator;

/// A user question and how many articles to retrieve for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagQuery {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl RagQuery {
    #[inline]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: None,
        }
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Generated answer with the articles that were placed in its context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagAnswer {
    pub text: String,
    pub used_context: Vec<Document>,
}

// Embeddings module
// Turns article text and questions into fixed-length vectors


pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use ollama::{ModelInfo, OllamaClient};

/// Characters per token used when estimating input length
pub const CHARS_PER_TOKEN: usize = 4;

/// Maps text to a vector of a fixed dimension.
///
/// The same text always maps to the same vector for a given model, and
/// every vector returned has exactly [`Embedder::dimension`] components.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, results in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Rough token estimate for length limiting
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Cut `text` to at most `max_tokens` estimated tokens, on a char boundary
#[inline]
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text.get(..byte_index).unwrap_or(text),
        None => text,
    }
}

/// Scale `vector` to unit length; the zero vector is left unchanged
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

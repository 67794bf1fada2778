#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{Embedder, estimate_token_count, normalize, truncate_to_tokens};
use crate::config::EmbeddingConfig;
use crate::http::{self, RetryPolicy};
use crate::{RagError, Result};

/// Embedder backed by an Ollama server's `/api/embed` endpoint
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    dimension: usize,
    normalize: bool,
    batch_size: usize,
    max_input_tokens: usize,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RagError::Config(format!("Failed to build Ollama URL: {}", e)))?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            dimension: config.dimension as usize,
            normalize: config.normalize,
            batch_size: (config.batch_size as usize).max(1),
            max_input_tokens: config.max_input_tokens as usize,
            agent: http::agent(Duration::from_secs(config.timeout_secs)),
            retry: RetryPolicy::new(config.retry_attempts),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = http::agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Test connection to the Ollama server and verify the model is pulled
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models()?;
        let available = models
            .iter()
            .any(|m| m.name == self.model || m.name == format!("{}:latest", self.model));

        if !available {
            let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, names
            );
            return Err(RagError::Embedding(format!(
                "Model '{}' is not available. Available models: {:?}",
                self.model, names
            )));
        }

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// List all models the server has pulled
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let response_text = http::call_with_retry(&self.retry, url.as_str(), || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .map_err(|e| RagError::Embedding(format!("Failed to fetch models: {}", e)))?;

        let models_response: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse models response: {}", e)))?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Embed `texts` in server-sized batches, blocking the calling thread
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            results.extend(self.embed_single_batch(chunk)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts
            .iter()
            .map(|text| {
                if estimate_token_count(text) > self.max_input_tokens {
                    debug!(
                        "Truncating input of ~{} tokens to {}",
                        estimate_token_count(text),
                        self.max_input_tokens
                    );
                }
                truncate_to_tokens(text, self.max_input_tokens)
            })
            .collect();

        let request_json = serde_json::to_string(&EmbedRequest {
            model: &self.model,
            input: &inputs,
        })
        .map_err(|e| RagError::Embedding(format!("Failed to serialize embedding request: {}", e)))?;

        let url = self.endpoint("/api/embed")?;
        let response_text = http::call_with_retry(&self.retry, url.as_str(), || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .map_err(|e| RagError::Embedding(format!("Failed to generate embeddings: {}", e)))?;

        let response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        response
            .embeddings
            .into_iter()
            .map(|embedding| self.finish_vector(embedding))
            .collect()
    }

    fn finish_vector(&self, mut embedding: Vec<f32>) -> Result<Vec<f32>> {
        if embedding.len() != self.dimension {
            return Err(RagError::Embedding(format!(
                "Model '{}' returned {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dimension
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(RagError::Embedding(
                "Model returned a non-finite embedding".to_string(),
            ));
        }
        if self.normalize {
            normalize(&mut embedding);
        }
        Ok(embedding)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Config(format!("Failed to build URL for {}: {}", path, e)))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("Server returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || client.embed_texts(&texts))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
    }
}

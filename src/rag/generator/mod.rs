
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::GenerationConfig;
use crate::http::{self, RetryPolicy};
use crate::{RagError, Result};

const ANSWER_POINTER: &str = "/candidates/0/content/parts/0/text";

/// Produces a natural-language answer for a question and its context
#[async_trait]
pub trait Generator: Send + Sync {
    /// `context` may be empty, in which case the question is asked without framing
    async fn generate(&self, question: &str, context: &str) -> Result<String>;
}

/// Prompt sent to the model
#[inline]
pub fn build_prompt(question: &str, context: &str) -> String {
    if context.trim().is_empty() {
        format!("Question: {question}")
    } else {
        format!(
            "Use the following context to answer the question:\n\n{context}\n\nQuestion: {question}"
        )
    }
}

/// Answer text from a `generateContent` response body, if it has a usable one
#[inline]
pub fn extract_answer(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer(ANSWER_POINTER)
        .and_then(serde_json::Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// Generator speaking the Gemini `generateContent` protocol
#[derive(Debug, Clone)]
pub struct GeminiClient {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    fallback_answer: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let endpoint_str = format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        let endpoint = Url::parse(&endpoint_str).map_err(|e| {
            RagError::Config(format!("Invalid generation endpoint {}: {}", endpoint_str, e))
        })?;

        let api_key = config.resolved_api_key();
        if api_key.is_none() {
            warn!("No Gemini API key configured, generation requests will likely be rejected");
        }

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            api_key,
            fallback_answer: config.fallback_answer.clone(),
            agent: http::agent(Duration::from_secs(config.timeout_secs)),
            retry: RetryPolicy::new(config.retry_attempts),
        })
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        url
    }

    /// Send the prompt and return the answer text, blocking the calling thread
    #[inline]
    pub fn generate_blocking(&self, question: &str, context: &str) -> Result<String> {
        let prompt = build_prompt(question, context);
        debug!(
            "Generating answer with {} ({} prompt chars)",
            self.model,
            prompt.chars().count()
        );

        let request_json = serde_json::to_string(&GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: &prompt }],
            }],
        })
        .map_err(|e| RagError::Generation(format!("Failed to serialize request: {}", e)))?;

        let url = self.request_url();
        let body = http::call_with_retry(&self.retry, self.endpoint.as_str(), || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .map_err(|e| RagError::Generation(format!("Gemini request failed: {}", e)))?;

        match extract_answer(&body) {
            Some(answer) => {
                info!("Generated answer ({} chars)", answer.chars().count());
                Ok(answer)
            }
            None => {
                warn!("Gemini response had no usable answer text, using fallback");
                Ok(self.fallback_answer.clone())
            }
        }
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let client = self.clone();
        let question = question.to_string();
        let context = context.to_string();
        tokio::task::spawn_blocking(move || client.generate_blocking(&question, &context))
            .await
            .map_err(|e| RagError::Generation(format!("Generation task failed: {}", e)))?
    }
}


use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::{Config, FeedLocation};
use crate::documents::Document;
use crate::http::{self, RetryPolicy};
use crate::{RagError, Result};

/// Supplies the current set of articles to ingest
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Document>>;
}

/// One entry of a JSON feed; missing fields read as empty
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FeedItem {
    title: String,
    link: String,
    content: String,
}

/// Reads a JSON array of `{title, link, content}` from a URL or a file
#[derive(Debug, Clone)]
pub struct JsonFeedSource {
    location: FeedLocation,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl JsonFeedSource {
    #[inline]
    pub fn new(location: FeedLocation, timeout: Duration) -> Self {
        Self {
            location,
            agent: http::agent(timeout),
            retry: RetryPolicy::default(),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let location = config
            .feed_location()
            .map_err(|e| RagError::Config(e.to_string()))?;
        Ok(Self::new(
            location,
            Duration::from_secs(config.feed.timeout_secs),
        ))
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn fetch_url_blocking(&self, url: &Url) -> Result<String> {
        http::call_with_retry(&self.retry, url.as_str(), || {
            self.agent
                .get(url.as_str())
                .header("Accept", "application/json")
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .map_err(|e| RagError::Feed(format!("Failed to fetch feed from {}: {}", url, e)))
    }
}

/// Parse a feed body into documents with deterministic ids
#[inline]
pub fn parse_feed(body: &str) -> Result<Vec<Document>> {
    let items: Vec<FeedItem> = serde_json::from_str(body)
        .map_err(|e| RagError::Feed(format!("Feed is not a JSON array of articles: {}", e)))?;

    Ok(items
        .into_iter()
        .map(|item| Document::new(item.title, item.link, item.content))
        .collect())
}

#[async_trait]
impl FeedSource for JsonFeedSource {
    async fn fetch(&self) -> Result<Vec<Document>> {
        let body = match &self.location {
            FeedLocation::Url(url) => {
                debug!("Fetching feed from {}", url);
                let source = self.clone();
                let url = url.clone();
                tokio::task::spawn_blocking(move || source.fetch_url_blocking(&url))
                    .await
                    .map_err(|e| RagError::Feed(format!("Feed task failed: {}", e)))??
            }
            FeedLocation::File(path) => {
                debug!("Reading feed from {:?}", path);
                tokio::fs::read_to_string(path).await.map_err(|e| {
                    RagError::Feed(format!("Failed to read feed file {:?}: {}", path, e))
                })?
            }
        };

        let documents = parse_feed(&body)?;
        info!("Feed returned {} articles", documents.len());
        Ok(documents)
    }
}

// src/feed/source.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use std::time::Duration;

use crate::feed::{parse, FeedEntry};

/// Anything that can produce the current entry list of one feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<FeedEntry>>;
    /// Identity used to key the cursor (normally the URL).
    fn key(&self) -> &str;
}

/// Fetches a feed over HTTP with a fixed per-request timeout.
pub struct HttpFeed {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(12),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<Vec<FeedEntry>> {
        let t0 = std::time::Instant::now();
        let body = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .context("feed http get()")?
            .error_for_status()
            .context("feed http status")?
            .text()
            .await
            .context("feed http .text()")?;
        let entries = parse::parse_document(&body, Utc::now())?;
        tracing::debug!(
            target: "feed",
            url = %self.url,
            entries = entries.len(),
            ms = t0.elapsed().as_millis() as u64,
            "fetched"
        );
        counter!("feed_entries_fetched_total").increment(entries.len() as u64);
        Ok(entries)
    }

    fn key(&self) -> &str {
        &self.url
    }
}

/// In-memory document, for fixtures and the `feed_check` tool.
pub struct StaticFeed {
    key: String,
    xml: String,
}

impl StaticFeed {
    pub fn new(key: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            xml: xml.into(),
        }
    }

    pub fn from_fixture(xml: &str) -> Self {
        Self::new("fixture", xml)
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(&self) -> Result<Vec<FeedEntry>> {
        parse::parse_document(&self.xml, Utc::now())
    }

    fn key(&self) -> &str {
        &self.key
    }
}

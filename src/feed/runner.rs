// src/feed/runner.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::cursor::{to_unix_f64, CursorStore, FeedCursor};
use super::engine::{FeedEngine, PollReport};
use super::source::{FeedSource, HttpFeed};
use crate::config::FeedConfig;
use crate::format::MessageFormatter;
use crate::notify::Notifier;
use crate::state::MonitorState;

/// Poll loop for one feed: fetch → process → save.
///
/// The cursor is read from disk on the first successful fetch and then kept in
/// memory; saving only makes it durable across restarts.
pub struct FeedMonitor {
    source: Arc<dyn FeedSource>,
    store: CursorStore,
    cursor: Mutex<Option<FeedCursor>>,
    engine: FeedEngine,
    notifier: Arc<dyn Notifier>,
    state: MonitorState,
    interval: Duration,
}

impl FeedMonitor {
    pub fn new(
        source: Arc<dyn FeedSource>,
        store: CursorStore,
        engine: FeedEngine,
        notifier: Arc<dyn Notifier>,
        state: MonitorState,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            cursor: Mutex::new(None),
            engine,
            notifier,
            state,
            interval,
        }
    }

    /// `None` when no feed URL is configured.
    ///
    /// A `state_path` pointing at an existing directory gets one cursor file per feed URL.
    pub fn from_config(
        cfg: &FeedConfig,
        process_start: DateTime<Utc>,
        formatter: MessageFormatter,
        notifier: Arc<dyn Notifier>,
        state: MonitorState,
    ) -> Option<Self> {
        let url = cfg.url.as_deref()?;
        let store = if cfg.state_path.is_dir() {
            CursorStore::keyed(&cfg.state_path, url)
        } else {
            CursorStore::new(cfg.state_path.clone())
        };
        Some(Self::new(
            Arc::new(HttpFeed::new(url).with_timeout(cfg.timeout_secs)),
            store,
            FeedEngine::from_config(cfg, process_start, formatter),
            notifier,
            state,
            Duration::from_secs(cfg.poll_secs),
        ))
    }

    pub fn source(&self) -> Arc<dyn FeedSource> {
        Arc::clone(&self.source)
    }

    pub fn store(&self) -> &CursorStore {
        &self.store
    }

    /// One full cycle. A fetch error leaves the cursor untouched (boot mode
    /// included) and is recorded in the shared state.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollReport> {
        super::ensure_metrics_described();
        counter!("feed_polls_total").increment(1);
        gauge!("feed_last_poll_ts").set(to_unix_f64(now));

        let entries = match self.source.fetch().await {
            Ok(entries) => entries,
            Err(e) => {
                counter!("feed_fetch_errors_total").increment(1);
                self.state.record_feed_error(now, &e).await;
                return Err(e);
            }
        };

        let mut guard = self.cursor.lock().await;
        if guard.is_none() {
            *guard = Some(self.store.load().await);
        }
        let cursor = guard.get_or_insert_with(FeedCursor::default);
        let report = self
            .engine
            .process(cursor, entries, now, self.notifier.as_ref())
            .await;

        // Unsaved progress only means possible re-delivery after a restart.
        if let Err(e) = self.store.save(cursor).await {
            tracing::warn!(target: "feed", path = %self.store.path().display(), "cursor save failed: {e:#}");
        }
        drop(guard);
        self.state.record_feed_poll(now, &report).await;

        tracing::debug!(
            target: "feed",
            fetched = report.fetched,
            boot = report.boot,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            suppressed = report.suppressed.len(),
            deferred = report.deferred,
            "poll done"
        );
        Ok(report)
    }

    pub async fn run(self) {
        tracing::info!(
            target: "feed",
            feed = %self.source.key(),
            cursor = %self.store.path().display(),
            interval_s = self.interval.as_secs(),
            "feed monitor started"
        );
        loop {
            if let Err(e) = self.poll_once(Utc::now()).await {
                tracing::warn!(target: "feed", feed = %self.source.key(), "poll failed: {e:#}");
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

pub fn spawn_feed_monitor(monitor: FeedMonitor) -> JoinHandle<()> {
    tokio::spawn(monitor.run())
}

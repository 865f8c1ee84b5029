// src/state.rs
//! Shared, lock-guarded monitor status.
//!
//! Written by the health and feed loops, read by the command loop and the
//! HTTP status route. The pause flag is the only value flowing the other way.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::feed::engine::PollReport;
use crate::health::{HealthState, Transition, Verdict};

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSnapshot {
    pub verdict: Verdict,
    pub success_streak: u32,
    pub fail_streak: u32,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<bool>,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub checks_total: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedSnapshot {
    pub url: Option<String>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_delivered_id: Option<String>,
    pub delivered_total: u64,
    pub polls_total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub service: String,
    pub started_at: DateTime<Utc>,
    pub paused: bool,
    pub health: HealthSnapshot,
    pub feed: FeedSnapshot,
}

#[derive(Clone)]
pub struct MonitorState {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl MonitorState {
    pub fn new(service: impl Into<String>, started_at: DateTime<Utc>, feed_url: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StatusSnapshot {
                service: service.into(),
                started_at,
                paused: false,
                health: HealthSnapshot::default(),
                feed: FeedSnapshot {
                    url: feed_url,
                    ..FeedSnapshot::default()
                },
            })),
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn is_paused(&self) -> bool {
        self.inner.read().await.paused
    }

    /// Set the pause flag; returns the previous value.
    pub async fn set_paused(&self, paused: bool) -> bool {
        let mut g = self.inner.write().await;
        std::mem::replace(&mut g.paused, paused)
    }

    pub async fn record_health(
        &self,
        state: &HealthState,
        ok: bool,
        at: DateTime<Utc>,
        transition: Option<&Transition>,
    ) {
        let mut g = self.inner.write().await;
        let h = &mut g.health;
        h.verdict = state.verdict;
        h.success_streak = state.success_streak;
        h.fail_streak = state.fail_streak;
        h.last_check_at = Some(at);
        h.last_outcome = Some(ok);
        h.checks_total += 1;
        if let Some(t) = transition {
            h.last_transition_at = Some(t.at());
        }
    }

    pub async fn record_feed_poll(&self, at: DateTime<Utc>, report: &PollReport) {
        let mut g = self.inner.write().await;
        let f = &mut g.feed;
        f.last_poll_at = Some(at);
        f.last_error = None;
        f.polls_total += 1;
        f.delivered_total += report.delivered.len() as u64;
        if let Some(id) = report.delivered.last() {
            f.last_delivered_id = Some(id.clone());
        }
    }

    pub async fn record_feed_error(&self, at: DateTime<Utc>, err: &anyhow::Error) {
        let mut g = self.inner.write().await;
        g.feed.last_poll_at = Some(at);
        g.feed.polls_total += 1;
        g.feed.last_error = Some(format!("{err:#}"));
    }
}

// src/feed/engine.rs
//! Dedup + throttle engine.
//!
//! One call to [`FeedEngine::process`] is one poll cycle over an already
//! fetched entry list:
//! - first cycle in boot mode: send the newest qualifying entry once, mark
//!   everything seen, done;
//! - otherwise: drop seen ids, mark (without sending) pre-start history and
//!   filtered categories, deliver the rest oldest-first under the per-poll
//!   budget and cooldown. Entries held back by the throttle stay unseen and
//!   are reconsidered on the next cycle.

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::antiflutter::{AntiFlutter, Gate};
use crate::config::FeedConfig;
use crate::feed::cursor::FeedCursor;
use crate::feed::{Category, FeedEntry};
use crate::format::MessageFormatter;
use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Seen,
    History,
    Category,
    Analytics,
}

impl Rejection {
    fn as_str(self) -> &'static str {
        match self {
            Rejection::Seen => "seen",
            Rejection::History => "history",
            Rejection::Category => "category",
            Rejection::Analytics => "analytics",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedPolicy {
    pub allowed: Vec<Category>,
    pub skip_analytics: bool,
    /// Entries published before this instant are marked seen without sending.
    pub ignore_before: Option<DateTime<Utc>>,
    pub send_last_on_boot: bool,
    pub seen_cap: usize,
}

impl FeedPolicy {
    pub fn from_config(cfg: &FeedConfig, process_start: DateTime<Utc>) -> Self {
        Self {
            allowed: cfg.allowed_categories.clone(),
            skip_analytics: cfg.skip_analytics,
            ignore_before: cfg.boot_ignore_history.then_some(process_start),
            send_last_on_boot: cfg.send_last_on_boot,
            seen_cap: cfg.seen_cap,
        }
    }

    /// Category / analytics part of the send filter.
    pub fn classification_filter(&self, e: &FeedEntry) -> Result<(), Rejection> {
        if !self.allowed.contains(&e.category) {
            return Err(Rejection::Category);
        }
        if self.skip_analytics && e.analytics {
            return Err(Rejection::Analytics);
        }
        Ok(())
    }

    /// Full send filter applied on regular cycles.
    pub fn send_filter(&self, cursor: &FeedCursor, e: &FeedEntry) -> Result<(), Rejection> {
        if cursor.is_seen(&e.id) {
            return Err(Rejection::Seen);
        }
        if matches!(self.ignore_before, Some(start) if e.published < start) {
            return Err(Rejection::History);
        }
        self.classification_filter(e)
    }

    /// Newest entry passing the classification filter; ties go to the later item in the document.
    pub fn pick_latest<'a>(&self, entries: &'a [FeedEntry]) -> Option<&'a FeedEntry> {
        entries
            .iter()
            .filter(|e| self.classification_filter(e).is_ok())
            .max_by_key(|e| e.published)
    }
}

/// What happened in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub boot: bool,
    /// Ids handed to the notifier successfully, in delivery order.
    pub delivered: Vec<String>,
    /// Ids whose send failed (still marked seen).
    pub failed: Vec<String>,
    /// Ids marked seen without a send attempt.
    pub suppressed: Vec<String>,
    /// Candidates held back by the throttle.
    pub deferred: usize,
}

pub struct FeedEngine {
    policy: FeedPolicy,
    throttle: AntiFlutter,
    formatter: MessageFormatter,
}

impl FeedEngine {
    pub fn new(policy: FeedPolicy, throttle: AntiFlutter, formatter: MessageFormatter) -> Self {
        Self {
            policy,
            throttle,
            formatter,
        }
    }

    pub fn from_config(
        cfg: &FeedConfig,
        process_start: DateTime<Utc>,
        formatter: MessageFormatter,
    ) -> Self {
        Self::new(
            FeedPolicy::from_config(cfg, process_start),
            AntiFlutter::new(cfg.cooldown_secs, cfg.max_per_poll),
            formatter,
        )
    }

    pub fn policy(&self) -> &FeedPolicy {
        &self.policy
    }

    pub fn formatter(&self) -> &MessageFormatter {
        &self.formatter
    }

    pub fn pick_latest<'a>(&self, entries: &'a [FeedEntry]) -> Option<&'a FeedEntry> {
        self.policy.pick_latest(entries)
    }

    /// Run one poll cycle against `cursor`. The caller persists the cursor afterwards.
    pub async fn process(
        &self,
        cursor: &mut FeedCursor,
        entries: Vec<FeedEntry>,
        now: DateTime<Utc>,
        notifier: &dyn Notifier,
    ) -> PollReport {
        let mut report = PollReport {
            fetched: entries.len(),
            ..PollReport::default()
        };

        if self.policy.send_last_on_boot && !cursor.boot_sent {
            self.boot_cycle(cursor, &entries, now, notifier, &mut report)
                .await;
        } else {
            self.regular_cycle(cursor, entries, now, notifier, &mut report)
                .await;
        }

        cursor.trim(self.policy.seen_cap);
        report
    }

    async fn boot_cycle(
        &self,
        cursor: &mut FeedCursor,
        entries: &[FeedEntry],
        now: DateTime<Utc>,
        notifier: &dyn Notifier,
        report: &mut PollReport,
    ) {
        report.boot = true;
        if let Some(latest) = self.pick_latest(entries) {
            let text = self.formatter.feed_entry(latest);
            match notifier.notify(&text).await {
                Ok(()) => {
                    counter!("feed_notifications_total", "kind" => "boot").increment(1);
                    tracing::info!(target: "feed", id = %latest.id, title = %latest.title, "boot catch-up sent");
                    report.delivered.push(latest.id.clone());
                }
                Err(e) => {
                    tracing::warn!(target: "feed", id = %latest.id, "boot catch-up send failed: {e:#}");
                    report.failed.push(latest.id.clone());
                }
            }
        } else {
            tracing::info!(target: "feed", fetched = entries.len(), "boot: no qualifying entry to catch up on");
        }

        for e in entries {
            if !cursor.is_seen(&e.id) {
                cursor.mark_seen(&e.id);
                if !report.delivered.contains(&e.id) && !report.failed.contains(&e.id) {
                    report.suppressed.push(e.id.clone());
                }
            }
        }
        // Boot send is not itself throttled, but it starts the cooldown clock.
        cursor.set_last_sent(now);
        cursor.boot_sent = true;
    }

    async fn regular_cycle(
        &self,
        cursor: &mut FeedCursor,
        entries: Vec<FeedEntry>,
        now: DateTime<Utc>,
        notifier: &dyn Notifier,
        report: &mut PollReport,
    ) {
        let mut candidates: Vec<FeedEntry> = Vec::new();
        for e in entries {
            match self.policy.send_filter(cursor, &e) {
                Ok(()) => {
                    // Same id twice in one document: keep the first.
                    if !candidates.iter().any(|c| c.id == e.id) {
                        candidates.push(e);
                    }
                }
                Err(Rejection::Seen) => {}
                Err(reason) => {
                    counter!("feed_filtered_total", "reason" => reason.as_str()).increment(1);
                    tracing::debug!(target: "feed", id = %e.id, reason = reason.as_str(), "suppressed");
                    cursor.mark_seen(&e.id);
                    report.suppressed.push(e.id);
                }
            }
        }

        // Oldest first; stable sort keeps document order for equal timestamps.
        candidates.sort_by_key(|e| e.published);

        let mut sent = 0usize;
        for (idx, e) in candidates.iter().enumerate() {
            match self.throttle.check(cursor.last_sent_at(), sent, now) {
                Gate::Open => {}
                gate => {
                    report.deferred = candidates.len() - idx;
                    tracing::debug!(target: "feed", ?gate, deferred = report.deferred, "throttled");
                    break;
                }
            }

            let text = self.formatter.feed_entry(e);
            match notifier.notify(&text).await {
                Ok(()) => {
                    cursor.set_last_sent(now);
                    sent += 1;
                    counter!("feed_notifications_total", "kind" => "entry").increment(1);
                    tracing::info!(target: "feed", id = %e.id, category = %e.category, title = %e.title, "notified");
                    report.delivered.push(e.id.clone());
                }
                Err(err) => {
                    tracing::warn!(target: "feed", id = %e.id, "send failed, entry dropped: {err:#}");
                    report.failed.push(e.id.clone());
                }
            }
            cursor.mark_seen(&e.id);
        }
    }
}

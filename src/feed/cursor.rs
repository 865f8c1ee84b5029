// src/feed/cursor.rs
//! Persisted feed cursor: bounded seen-id list, last send time, boot flag.
//!
//! On disk: `{ "seen_ids": [...], "last_sent_ts": 1725609600.0, "boot_sent": true }`.
//! A missing or corrupt file loads as an empty cursor.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_SEEN_CAP: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedCursor {
    /// Insertion-ordered, oldest first.
    #[serde(default, alias = "last_ids")]
    pub seen_ids: VecDeque<String>,
    /// Unix seconds of the last delivered notification (0.0 = never).
    #[serde(default)]
    pub last_sent_ts: f64,
    #[serde(default)]
    pub boot_sent: bool,
}

impl FeedCursor {
    pub fn is_seen(&self, id: &str) -> bool {
        self.seen_ids.iter().any(|s| s == id)
    }

    /// Append `id` unless already present.
    pub fn mark_seen(&mut self, id: &str) {
        if !self.is_seen(id) {
            self.seen_ids.push_back(id.to_string());
        }
    }

    /// Evict oldest ids until at most `cap` remain.
    pub fn trim(&mut self, cap: usize) {
        while self.seen_ids.len() > cap {
            self.seen_ids.pop_front();
        }
    }

    pub fn last_sent_at(&self) -> Option<DateTime<Utc>> {
        if self.last_sent_ts <= 0.0 {
            return None;
        }
        let secs = self.last_sent_ts.trunc() as i64;
        let nanos = (self.last_sent_ts.fract() * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    pub fn set_last_sent(&mut self, at: DateTime<Utc>) {
        self.last_sent_ts = to_unix_f64(at);
    }
}

pub(crate) fn to_unix_f64(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1e9
}

/// JSON file store for one feed's cursor.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// One file per feed inside `dir`, named after a hash of the feed URL.
    pub fn keyed(dir: impl AsRef<Path>, feed_url: &str) -> Self {
        Self::new(dir.as_ref().join(format!("feed_{}.json", url_key(feed_url))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cursor; absence or corruption yields an empty one.
    pub async fn load(&self) -> FeedCursor {
        match fs::read_to_string(&self.path).await {
            Ok(s) => match serde_json::from_str(&s) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(target: "feed", path = %self.path.display(), "corrupt cursor, starting empty: {e}");
                    FeedCursor::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FeedCursor::default(),
            Err(e) => {
                tracing::warn!(target: "feed", path = %self.path.display(), "read cursor: {e}");
                FeedCursor::default()
            }
        }
    }

    /// Write via a sibling temp file + rename so readers never see a partial document.
    pub async fn save(&self, cursor: &FeedCursor) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let body = serde_json::to_vec(cursor).context("serializing cursor")?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        Ok(())
    }
}

fn url_key(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(url.trim().as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trim_evicts_oldest_first() {
        let mut c = FeedCursor::default();
        for i in 0..5 {
            c.mark_seen(&format!("id-{i}"));
        }
        c.mark_seen("id-0"); // already present, no reorder
        c.trim(3);
        assert_eq!(c.seen_ids, VecDeque::from(vec!["id-2".to_string(), "id-3".into(), "id-4".into()]));
    }

    #[test]
    fn legacy_last_ids_key_is_accepted() {
        let c: FeedCursor =
            serde_json::from_str(r#"{"last_ids":["a","b"],"last_sent_ts":12.5}"#).unwrap();
        assert!(c.is_seen("a"));
        assert!(!c.boot_sent);
        assert_eq!(c.last_sent_ts, 12.5);
    }

    #[test]
    fn last_sent_roundtrips_through_unix_float() {
        let mut c = FeedCursor::default();
        assert_eq!(c.last_sent_at(), None);
        let t = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        c.set_last_sent(t);
        assert_eq!(c.last_sent_at(), Some(t));
    }

    #[test]
    fn keyed_store_is_stable_per_url() {
        let a = CursorStore::keyed("/tmp/x", "https://status.example.com/history.atom");
        let b = CursorStore::keyed("/tmp/x", " https://status.example.com/history.atom ");
        let c = CursorStore::keyed("/tmp/x", "https://other.example.com/feed.rss");
        assert_eq!(a.path(), b.path());
        assert_ne!(a.path(), c.path());
    }
}

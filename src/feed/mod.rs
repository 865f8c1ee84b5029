// src/feed/mod.rs
//! Incident-feed pipeline: fetch + parse (Atom/RSS), classify, dedup + throttle
//! against a persisted cursor, format and hand off to the notifier.

pub mod classify;
pub mod cursor;
pub mod engine;
pub mod parse;
pub mod runner;
pub mod source;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use regex::Regex;

pub use classify::Category;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_polls_total", "Feed poll cycles run.");
        describe_counter!(
            "feed_entries_fetched_total",
            "Entries parsed from the feed document."
        );
        describe_counter!(
            "feed_filtered_total",
            "Entries marked seen without delivery, by reason."
        );
        describe_counter!(
            "feed_notifications_total",
            "Feed notifications handed to the notifier."
        );
        describe_counter!("feed_fetch_errors_total", "Feed fetch/parse errors.");
        describe_gauge!("feed_last_poll_ts", "Unix ts when the feed was last polled.");
    });
}

/// A normalized feed item. Built fresh on every fetch and never mutated.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    /// HTML-stripped summary/description.
    pub body: String,
    /// Timestamp string as it appeared in the document.
    pub published_raw: String,
    pub published: DateTime<Utc>,
    pub link: String,
    pub category: Category,
    pub analytics: bool,
}

impl FeedEntry {
    /// Build an entry, deriving id fallback, category and analytics flag.
    pub fn new(
        native_id: Option<&str>,
        title: &str,
        body: &str,
        published_raw: &str,
        link: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let title = title.trim().to_string();
        let body = normalize_text(body);
        let published_raw = published_raw.trim().to_string();
        let id = match native_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => composite_id(&title, &published_raw),
        };
        let category = classify::classify(&title, &body);
        let analytics = classify::is_analytics(&title, &body);
        Self {
            id,
            published: parse::parse_timestamp(&published_raw).unwrap_or(now),
            title,
            body,
            published_raw,
            link: link.trim().to_string(),
            category,
            analytics,
        }
    }
}

/// Stable id for items without a native one: same title + raw timestamp
/// always yields the same key across fetches.
pub fn composite_id(title: &str, published_raw: &str) -> String {
    format!("{}|{}", title.trim(), published_raw.trim())
}

/// Normalize body text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags (replace with a space so adjacent words stay apart)
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Collapse whitespace (incl. NBSP)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap: 4000 chars
    if out.chars().count() > 4000 {
        out = out.chars().take(4000).collect();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "<p>Chat&nbsp;<b>degraded</b></p>\n\n<small>Posted</small>";
        assert_eq!(normalize_text(s), "Chat degraded Posted");
    }

    #[test]
    fn missing_id_falls_back_to_title_and_raw_timestamp() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let a = FeedEntry::new(None, " Outage ", "", "Sat, 06 Sep 2025 08:00:00 GMT", "", now);
        let b = FeedEntry::new(Some("  "), "Outage", "", "Sat, 06 Sep 2025 08:00:00 GMT", "", now);
        assert_eq!(a.id, "Outage|Sat, 06 Sep 2025 08:00:00 GMT");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn unparsable_timestamp_uses_now() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let e = FeedEntry::new(Some("x"), "t", "", "yesterday-ish", "", now);
        assert_eq!(e.published, now);
    }
}

//! One-shot feed diagnostic: fetch (URL) or read (file), classify, and print
//! what each entry would look like as a notification. Never touches the cursor.
//!
//! Usage: `feed_check <url|path>`; falls back to `STATUS_FEED_URL`.

use anyhow::{Context, Result};
use chrono::Utc;
use status_monitor::{
    config::MonitorConfig,
    feed::{
        engine::FeedPolicy,
        parse,
        source::{FeedSource, HttpFeed},
    },
    format::MessageFormatter,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let _ = dotenvy::dotenv();

    let cfg = MonitorConfig::from_env();
    let arg = std::env::args()
        .nth(1)
        .or_else(|| cfg.feed.url.clone())
        .context("usage: feed_check <url|path> (or set STATUS_FEED_URL)")?;

    let entries = if arg.starts_with("http://") || arg.starts_with("https://") {
        HttpFeed::new(arg.as_str())
            .with_timeout(cfg.feed.timeout_secs)
            .fetch()
            .await?
    } else {
        let xml = tokio::fs::read_to_string(&arg)
            .await
            .with_context(|| format!("reading {arg}"))?;
        println!("root: {:?} ({:?})", parse::sniff_root(&xml), parse::detect_kind(&xml));
        parse::parse_document(&xml, Utc::now())?
    };

    let policy = FeedPolicy::from_config(&cfg.feed, Utc::now());
    let formatter = MessageFormatter::from_config(&cfg.display);

    println!("{} entries", entries.len());
    for e in &entries {
        let verdict = match policy.classification_filter(e) {
            Ok(()) => "would send".to_string(),
            Err(reason) => format!("skip ({reason:?})"),
        };
        println!("---\n[{}] {} | {} | {}", e.category, e.published, e.id, verdict);
        println!("{}", formatter.feed_entry(e));
    }

    match policy.pick_latest(&entries) {
        Some(e) => println!("===\nboot catch-up would send: {}", e.id),
        None => println!("===\nboot catch-up: nothing qualifies"),
    }
    Ok(())
}

// src/notify/mod.rs
//! Outbound notification transports behind one narrow trait.
//!
//! Delivery is best-effort: callers log a failed send and move on, nothing is
//! retried from the monitoring loops.

pub mod discord;
pub mod email;
pub mod slack;
pub mod telegram;

use anyhow::{anyhow, Result};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::config::NotifyConfig;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Fallback sink when no transport is configured: the message goes to the log.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        tracing::info!(target: "notify", channel = "log", "{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Fans one message out to every configured transport.
/// Succeeds when at least one transport accepted the message.
pub struct NotifierMux {
    sinks: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    /// Build every transport whose credentials are present.
    pub fn from_config(cfg: &NotifyConfig) -> Self {
        let mut sinks: Vec<Box<dyn Notifier>> = Vec::new();

        if let Some(tg) = telegram::TelegramNotifier::from_config(cfg) {
            sinks.push(Box::new(tg));
        } else {
            tracing::info!(target: "notify", "Telegram disabled (TELEGRAM_BOT_TOKEN / CHAT_ID missing)");
        }
        if let Some(url) = &cfg.discord_webhook_url {
            sinks.push(Box::new(
                discord::DiscordNotifier::new(url.clone())
                    .with_timeout(cfg.timeout_secs)
                    .with_attempts(2),
            ));
        }
        if let Some(url) = &cfg.slack_webhook_url {
            sinks.push(Box::new(
                slack::SlackNotifier::new(url.clone()).with_timeout(cfg.timeout_secs),
            ));
        }
        if let Some(email_cfg) = &cfg.email {
            match email::EmailNotifier::from_config(email_cfg) {
                Ok(n) => sinks.push(Box::new(n)),
                Err(e) => tracing::warn!(target: "notify", "email disabled: {e:#}"),
            }
        }

        if sinks.is_empty() {
            tracing::warn!(target: "notify", "no notification transport configured, messages go to the log only");
        }
        Self::new(sinks)
    }

    pub fn channels(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("notify_sent_total", "Messages accepted by a transport.");
        describe_counter!("notify_failures_total", "Transport send failures.");
    });
}

#[async_trait::async_trait]
impl Notifier for NotifierMux {
    async fn notify(&self, text: &str) -> Result<()> {
        ensure_metrics_described();
        if self.sinks.is_empty() {
            return LogNotifier.notify(text).await;
        }

        let mut delivered = 0usize;
        for sink in &self.sinks {
            match sink.notify(text).await {
                Ok(()) => {
                    delivered += 1;
                    counter!("notify_sent_total", "channel" => sink.name()).increment(1);
                    tracing::debug!(target: "notify", channel = sink.name(), "sent");
                }
                Err(e) => {
                    counter!("notify_failures_total", "channel" => sink.name()).increment(1);
                    tracing::warn!(target: "notify", channel = sink.name(), "send failed: {e:#}");
                }
            }
        }

        if delivered == 0 {
            return Err(anyhow!("all {} notification channels failed", self.sinks.len()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        ok: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Notifier for Counting {
        async fn notify(&self, _text: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                Ok(())
            } else {
                Err(anyhow!("boom"))
            }
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn mux_succeeds_if_any_channel_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mux = NotifierMux::new(vec![
            Box::new(Counting { ok: false, calls: calls.clone() }),
            Box::new(Counting { ok: true, calls: calls.clone() }),
        ]);
        assert!(mux.notify("hi").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mux_fails_when_every_channel_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mux = NotifierMux::new(vec![Box::new(Counting { ok: false, calls })]);
        assert!(mux.notify("hi").await.is_err());
    }

    #[tokio::test]
    async fn empty_mux_logs_and_succeeds() {
        let mux = NotifierMux::new(vec![]);
        assert!(mux.notify("hi").await.is_ok());
        assert!(mux.channels().is_empty());
    }
}

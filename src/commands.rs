// src/commands.rs
//! Chat commands over the Telegram long poll.
//!
//! Only messages from the configured chat are handled; everything else is
//! acknowledged (offset advanced) and ignored.

use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::feed::engine::FeedPolicy;
use crate::feed::source::FeedSource;
use crate::format::MessageFormatter;
use crate::health::probe::Probe;
use crate::ledger::ActivityLedger;
use crate::notify::telegram::{TelegramNotifier, Update};
use crate::state::MonitorState;

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Status,
    Now,
    Last,
    Help,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    /// First word of the message; leading `/` and a `@botname` suffix are optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.split_whitespace().next().unwrap_or_default();
        let word = word.strip_prefix('/').unwrap_or(word);
        let word = word.split('@').next().unwrap_or_default();
        match word.to_ascii_lowercase().as_str() {
            "pause" | "stop" => Ok(Command::Pause),
            "resume" | "start" => Ok(Command::Resume),
            "status" => Ok(Command::Status),
            "now" | "check" => Ok(Command::Now),
            "last" => Ok(Command::Last),
            "help" => Ok(Command::Help),
            other => anyhow::bail!("unknown command '{other}'"),
        }
    }
}

/// Feed access for the `last` command.
#[derive(Clone)]
pub struct LastEntryLookup {
    pub source: Arc<dyn FeedSource>,
    pub policy: FeedPolicy,
}

/// Turns a command into reply text. Has no transport of its own.
pub struct CommandHandler {
    service: String,
    state: MonitorState,
    probe: Option<Arc<dyn Probe>>,
    feed: Option<LastEntryLookup>,
    formatter: MessageFormatter,
}

impl CommandHandler {
    pub fn new(service: impl Into<String>, state: MonitorState, formatter: MessageFormatter) -> Self {
        Self {
            service: service.into(),
            state,
            probe: None,
            feed: None,
            formatter,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_feed(mut self, feed: LastEntryLookup) -> Self {
        self.feed = Some(feed);
        self
    }

    pub async fn handle(&self, cmd: Command) -> String {
        let f = &self.formatter;
        match cmd {
            Command::Pause => {
                let was = self.state.set_paused(true).await;
                tracing::info!(target: "commands", "health monitoring paused");
                f.pause_ack(true, !was)
            }
            Command::Resume => {
                let was = self.state.set_paused(false).await;
                tracing::info!(target: "commands", "health monitoring resumed");
                f.pause_ack(false, was)
            }
            Command::Status => f.status_report(&self.state.snapshot().await),
            Command::Now => match &self.probe {
                Some(p) => f.probe_now(&self.service, p.check().await),
                None => f.unavailable("now"),
            },
            // Read-only: the cursor is left alone.
            Command::Last => match &self.feed {
                Some(feed) => match feed.source.fetch().await {
                    Ok(entries) => match feed.policy.pick_latest(&entries) {
                        Some(e) => f.feed_entry(e),
                        None => f.unavailable("last"),
                    },
                    Err(e) => {
                        tracing::warn!(target: "commands", "last: feed fetch failed: {e:#}");
                        f.unavailable("last")
                    }
                },
                None => f.unavailable("last"),
            },
            Command::Help => f.help(),
        }
    }
}

pub struct CommandLoop {
    telegram: TelegramNotifier,
    handler: CommandHandler,
    ledger: Arc<dyn ActivityLedger>,
    poll_secs: u64,
}

impl CommandLoop {
    pub fn new(
        telegram: TelegramNotifier,
        handler: CommandHandler,
        ledger: Arc<dyn ActivityLedger>,
        poll_secs: u64,
    ) -> Self {
        Self {
            telegram,
            handler,
            ledger,
            poll_secs,
        }
    }

    /// Reply for one update as `(chat_id, text)`, or `None` when the update is ignored.
    pub async fn reply_for(&self, update: &Update) -> Option<(String, String)> {
        let msg = update.message.as_ref()?;
        let chat_id = msg.chat.id.to_string();
        if chat_id != self.telegram.chat_id() {
            tracing::debug!(target: "commands", chat = %chat_id, "message from foreign chat ignored");
            return None;
        }
        let text = msg.text.as_deref()?;
        let cmd = match text.parse::<Command>() {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::debug!(target: "commands", "{e}");
                return None;
            }
        };

        let actor = msg
            .from
            .as_ref()
            .map(|u| u.id.to_string())
            .unwrap_or_else(|| chat_id.clone());
        if let Err(e) = self.ledger.record_activity(&actor).await {
            tracing::warn!(target: "commands", "activity ledger: {e:#}");
        }

        tracing::info!(target: "commands", ?cmd, actor = %actor, "command");
        Some((chat_id, self.handler.handle(cmd).await))
    }

    pub async fn run(self) {
        tracing::info!(target: "commands", poll_s = self.poll_secs, "command loop started");
        let mut offset: Option<i64> = None;
        let mut backoff = BACKOFF_START;
        loop {
            match self.telegram.get_updates(offset, self.poll_secs).await {
                Ok(updates) => {
                    backoff = BACKOFF_START;
                    for u in updates {
                        offset = Some(u.update_id + 1);
                        if let Some((chat, reply)) = self.reply_for(&u).await {
                            if let Err(e) = self.telegram.send_to(&chat, &reply).await {
                                tracing::warn!(target: "commands", "reply failed: {e:#}");
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        target: "commands",
                        backoff_s = backoff.as_secs(),
                        at = %Utc::now(),
                        "getUpdates failed: {e:#}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                }
            }
        }
    }
}

fn next_backoff(cur: Duration) -> Duration {
    (cur * 2).min(BACKOFF_MAX)
}

pub fn spawn_command_loop(cmd: CommandLoop) -> JoinHandle<()> {
    tokio::spawn(cmd.run())
}

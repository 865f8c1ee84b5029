// tests/commands.rs
//
// Command handling without a network: replies are computed from the shared
// state, a scripted probe and a static feed.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use status_monitor::commands::{Command, CommandHandler, CommandLoop, LastEntryLookup};
use status_monitor::config::FeedConfig;
use status_monitor::feed::engine::FeedPolicy;
use status_monitor::feed::source::StaticFeed;
use status_monitor::format::MessageFormatter;
use status_monitor::health::probe::Probe;
use status_monitor::ledger::ActivityLedger;
use status_monitor::notify::telegram::{Chat, Message, TelegramNotifier, Update, User};
use status_monitor::state::MonitorState;

struct CountingProbe {
    ok: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl Probe for CountingProbe {
    async fn check(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ok
    }
    fn label(&self) -> String {
        "counting".into()
    }
}

#[derive(Default)]
struct MemLedger(Mutex<Vec<String>>);

#[async_trait]
impl ActivityLedger for MemLedger {
    async fn record_activity(&self, actor_id: &str) -> Result<()> {
        self.0.lock().unwrap().push(actor_id.to_string());
        Ok(())
    }
}

fn handler(state: &MonitorState) -> CommandHandler {
    CommandHandler::new("Cursor AI", state.clone(), MessageFormatter::default())
}

fn update(id: i64, chat: i64, from: i64, text: &str) -> Update {
    Update {
        update_id: id,
        message: Some(Message {
            chat: Chat { id: chat },
            from: Some(User {
                id: from,
                username: None,
            }),
            text: Some(text.to_string()),
        }),
    }
}

#[tokio::test]
async fn pause_and_resume_toggle_the_shared_flag() {
    let state = MonitorState::new("Cursor AI", Utc::now(), None);
    let h = handler(&state);

    assert!(h.handle(Command::Pause).await.contains("paused"));
    assert!(state.is_paused().await);
    assert!(h.handle(Command::Pause).await.contains("Already"));

    assert!(h.handle(Command::Resume).await.contains("resumed"));
    assert!(!state.is_paused().await);
}

#[tokio::test]
async fn status_mentions_service_and_pause_state() {
    let state = MonitorState::new("Cursor AI", Utc::now(), Some("https://x.example/feed".into()));
    state.set_paused(true).await;
    let reply = handler(&state).handle(Command::Status).await;
    assert!(reply.contains("Cursor AI"));
    assert!(reply.contains("unknown"));
    assert!(reply.contains("paused"));
    assert!(reply.contains("feed polled: never"));
}

#[tokio::test]
async fn now_probes_directly() {
    let state = MonitorState::new("Cursor AI", Utc::now(), None);
    let probe = Arc::new(CountingProbe {
        ok: false,
        calls: AtomicUsize::new(0),
    });
    let h = handler(&state).with_probe(probe.clone());
    let reply = h.handle(Command::Now).await;
    assert!(reply.contains("failed"));
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    // the debounced view is untouched
    assert_eq!(state.snapshot().await.health.checks_total, 0);

    assert!(handler(&state).handle(Command::Now).await.contains("not available"));
}

#[tokio::test]
async fn last_formats_newest_allowed_entry() {
    let state = MonitorState::new("Cursor AI", Utc::now(), None);
    let h = handler(&state).with_feed(LastEntryLookup {
        source: Arc::new(StaticFeed::from_fixture(include_str!("fixtures/atom.xml"))),
        policy: FeedPolicy::from_config(&FeedConfig::default(), Utc::now()),
    });
    let reply = h.handle(Command::Last).await;
    assert!(reply.contains("Elevated error rates in Chat"), "{reply}");
    assert!(reply.contains("https://status.example.com/incidents/3"));
}

#[tokio::test]
async fn only_the_configured_chat_is_served_and_activity_recorded() {
    let state = MonitorState::new("Cursor AI", Utc::now(), None);
    let ledger = Arc::new(MemLedger::default());
    let tg = TelegramNotifier::new("TOKEN".into(), "42".into())
        .with_api_base("http://127.0.0.1:9".into());
    let lp = CommandLoop::new(tg, handler(&state), ledger.clone(), 30);

    assert!(lp.reply_for(&update(1, 99, 7, "/pause")).await.is_none());
    assert!(!state.is_paused().await);

    assert!(lp.reply_for(&update(2, 42, 7, "hello there")).await.is_none());

    let (chat, reply) = lp.reply_for(&update(3, 42, 7, "/pause")).await.unwrap();
    assert_eq!(chat, "42");
    assert!(reply.contains("paused"));
    assert!(state.is_paused().await);

    let no_msg = Update {
        update_id: 4,
        message: None,
    };
    assert!(lp.reply_for(&no_msg).await.is_none());

    assert_eq!(*ledger.0.lock().unwrap(), vec!["7".to_string()]);
}

//! Status monitor service entrypoint.
//! Spawns the health, feed and command loops and serves the HTTP status surface.

use chrono::Utc;
use shuttle_axum::ShuttleAxum;
use std::sync::Arc;

use status_monitor::{
    commands::{spawn_command_loop, CommandHandler, CommandLoop, LastEntryLookup},
    config::MonitorConfig,
    feed::runner::{spawn_feed_monitor, FeedMonitor},
    format::MessageFormatter,
    health::{
        probe::{CompositeProbe, Probe},
        runner::{spawn_health_monitor, HealthMonitor},
    },
    init_tracing, ledger,
    metrics::Metrics,
    notify::{telegram::TelegramNotifier, Notifier, NotifierMux},
    state::MonitorState,
};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = MonitorConfig::load().unwrap_or_else(|e| {
        tracing::warn!("config file unusable, falling back to env + defaults: {e:#}");
        MonitorConfig::from_env()
    });
    let process_start = Utc::now();

    let metrics = match Metrics::init(&cfg) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!("metrics disabled: {e:#}");
            None
        }
    };

    let mux = NotifierMux::from_config(&cfg.notify);
    tracing::info!(channels = ?mux.channels(), "notifier ready");
    let notifier: Arc<dyn Notifier> = Arc::new(mux);
    let formatter = MessageFormatter::from_config(&cfg.display);
    let state = MonitorState::new(cfg.health.name.clone(), process_start, cfg.feed.url.clone());

    if cfg.notify.startup_message {
        if let Err(e) = notifier.notify(&formatter.startup(&cfg.health.name)).await {
            tracing::warn!("startup message failed: {e:#}");
        }
    }

    // --- health loop ---
    let probe: Arc<dyn Probe> = Arc::new(CompositeProbe::from_config(&cfg.health));
    let has_targets = !cfg.health.targets.is_empty();
    if cfg.health.enabled && has_targets {
        spawn_health_monitor(HealthMonitor::from_config(
            &cfg.health,
            Arc::clone(&probe),
            Arc::clone(&notifier),
            formatter.clone(),
            state.clone(),
        ));
    } else {
        tracing::info!(target: "health", enabled = cfg.health.enabled, has_targets, "health monitor not started");
    }

    // --- feed loop ---
    let feed = FeedMonitor::from_config(
        &cfg.feed,
        process_start,
        formatter.clone(),
        Arc::clone(&notifier),
        state.clone(),
    );
    let last_lookup = feed.as_ref().map(|f| LastEntryLookup {
        source: f.source(),
        policy: status_monitor::feed::engine::FeedPolicy::from_config(&cfg.feed, process_start),
    });
    match feed {
        Some(f) => {
            spawn_feed_monitor(f);
        }
        None => tracing::info!(target: "feed", "STATUS_FEED_URL not set, feed monitor not started"),
    }

    // --- command loop ---
    match TelegramNotifier::from_config(&cfg.notify) {
        Some(tg) if cfg.notify.commands_enabled => {
            let mut handler =
                CommandHandler::new(cfg.health.name.clone(), state.clone(), formatter.clone());
            if has_targets {
                handler = handler.with_probe(Arc::clone(&probe));
            }
            if let Some(lookup) = last_lookup {
                handler = handler.with_feed(lookup);
            }
            spawn_command_loop(CommandLoop::new(
                tg,
                handler,
                ledger::from_config(&cfg.ledger),
                cfg.notify.command_poll_secs,
            ));
        }
        _ => tracing::info!(target: "commands", "command loop not started"),
    }

    let mut router = status_monitor::create_router(state);
    if let Some(m) = &metrics {
        router = router.merge(m.router());
    }
    Ok(router.into())
}

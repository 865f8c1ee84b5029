// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod format;
pub mod state;

// Health pipeline: probes → debouncer → transitions
pub mod health;

// Incident feed pipeline: fetch → classify → dedup/throttle → cursor
pub mod antiflutter;
pub mod feed;

// Notifications, chat commands & interaction ledger
pub mod commands;
pub mod ledger;
pub mod notify;

pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::config::MonitorConfig;
pub use crate::notify::{Notifier, NotifierMux};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "status_monitor=info,warn";

/// Install the global subscriber. `LOG_FORMAT=json` selects JSON lines,
/// anything else compact text. Safe to call when a subscriber already exists.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

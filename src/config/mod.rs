// src/config/mod.rs
//! Process configuration.
//!
//! Layering, lowest to highest priority:
//! 1) built-in defaults
//! 2) TOML file: $MONITOR_CONFIG_PATH, else `config/monitor.toml` when present
//! 3) environment variables (`STATUS_*`, `HEALTH_*`, `TELEGRAM_BOT_TOKEN`, ...)
//!
//! Nothing is required: without a feed URL the feed pipeline stays idle, without
//! transport credentials notifications go to the log.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::feed::Category;
use crate::format::Locale;
use crate::health::probe::{CombineMode, ProbeMethod};

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";

const DEFAULT_HEALTH_URL: &str =
    "https://api2.cursor.sh/aiserver.v1.ChatService/StreamUnifiedChatWithTools";
const DEFAULT_HEALTH_BODY: &str = r#"{"messages":[{"role":"user","content":"ping"}],"model":"gpt-4"}"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub health: HealthConfig,
    pub feed: FeedConfig,
    pub display: DisplayConfig,
    pub notify: NotifyConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// Display name of the monitored service.
    pub name: String,
    pub targets: Vec<ProbeTarget>,
    pub combine: CombineMode,
    pub interval_secs: u64,
    /// Sampling interval while down or mid failure streak; defaults to interval / 4.
    pub degraded_interval_secs: Option<u64>,
    pub down_fails_min: u32,
    pub back_succ_min: u32,
    pub back_window_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "Cursor AI".to_string(),
            targets: vec![ProbeTarget {
                url: DEFAULT_HEALTH_URL.to_string(),
                method: ProbeMethod::Post,
                body: Some(DEFAULT_HEALTH_BODY.to_string()),
            }],
            combine: CombineMode::Single,
            interval_secs: 300,
            degraded_interval_secs: None,
            down_fails_min: 2,
            back_succ_min: 3,
            back_window_secs: 600,
            timeout_secs: 10,
        }
    }
}

impl HealthConfig {
    pub fn degraded_interval_secs(&self) -> u64 {
        self.degraded_interval_secs
            .unwrap_or(self.interval_secs / 4)
            .clamp(1, self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProbeTarget {
    pub url: String,
    #[serde(default)]
    pub method: ProbeMethod,
    /// JSON body sent with POST probes.
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: Option<String>,
    pub poll_secs: u64,
    pub state_path: PathBuf,
    pub max_per_poll: usize,
    pub cooldown_secs: i64,
    /// Drop entries published before process start.
    pub boot_ignore_history: bool,
    /// Send the newest qualifying entry once on the very first poll.
    pub send_last_on_boot: bool,
    pub allowed_categories: Vec<Category>,
    pub skip_analytics: bool,
    pub seen_cap: usize,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            poll_secs: 180,
            state_path: PathBuf::from("/tmp/status_feed_state.json"),
            max_per_poll: 2,
            cooldown_secs: 900,
            boot_ignore_history: true,
            send_last_on_boot: true,
            allowed_categories: Category::DEFAULT_ALLOWED.to_vec(),
            skip_analytics: true,
            seen_cap: crate::feed::cursor::DEFAULT_SEEN_CAP,
            timeout_secs: 12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub locale: Locale,
    /// Label printed next to local times, e.g. "Asia/Jerusalem".
    pub tz_label: String,
    /// Fixed offset used for local times, e.g. "+03:00".
    pub utc_offset: String,
    pub include_summary: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            locale: Locale::En,
            tz_label: "UTC".to_string(),
            utc_offset: "+00:00".to_string(),
            include_summary: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api_base: String,
    pub discord_webhook_url: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub email: Option<EmailConfig>,
    pub timeout_secs: u64,
    pub startup_message: bool,
    pub commands_enabled: bool,
    /// Server-side long-poll duration for inbound commands.
    pub command_poll_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: crate::notify::telegram::DEFAULT_API_BASE.to_string(),
            discord_webhook_url: None,
            slack_webhook_url: None,
            email: None,
            timeout_secs: 10,
            startup_message: true,
            commands_enabled: true,
            command_poll_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub to: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_subject_prefix() -> String {
    "[status]".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON file for the activity ledger; `None` disables it.
    pub path: Option<PathBuf>,
    pub service_id: String,
    pub service_name: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            service_id: "status-monitor".to_string(),
            service_name: None,
        }
    }
}

impl MonitorConfig {
    /// Defaults overlaid with the process environment only.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.sanitize();
        cfg
    }

    /// Full layering: defaults → TOML file → environment.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::from_toml_file(&pb)?
            }
            Err(_) => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_toml_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: Self = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Overlay values found through `get` (normally `std::env::var`).
    /// Unparsable values are ignored with a warning.
    pub fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // --- health ---
        let h = &mut self.health;
        set_parsed(&get, "HEALTH_ENABLED", &mut h.enabled, parse_bool);
        if let Some(v) = get("HEALTH_NAME") {
            h.name = v;
        }
        if let Some(urls) = get("HEALTH_URLS").or_else(|| get("HEALTH_URL")) {
            let method = get("HEALTH_METHOD")
                .and_then(|m| m.parse().ok())
                .unwrap_or(ProbeMethod::Get);
            let body = get("HEALTH_BODY");
            h.targets = split_list(&urls)
                .into_iter()
                .map(|url| ProbeTarget {
                    url,
                    method,
                    body: body.clone(),
                })
                .collect();
        }
        set_parsed(&get, "HEALTH_COMBINE", &mut h.combine, |v| v.parse().ok());
        set_parsed(&get, "HEALTH_INTERVAL_SEC", &mut h.interval_secs, |v| v.parse().ok());
        if let Some(v) = get("HEALTH_DEGRADED_INTERVAL_SEC").and_then(|v| v.parse().ok()) {
            h.degraded_interval_secs = Some(v);
        }
        set_parsed(&get, "HEALTH_DOWN_FAILS_MIN", &mut h.down_fails_min, |v| v.parse().ok());
        set_parsed(&get, "HEALTH_BACK_SUCC_MIN", &mut h.back_succ_min, |v| v.parse().ok());
        set_parsed(&get, "HEALTH_BACK_WINDOW_SEC", &mut h.back_window_secs, |v| v.parse().ok());
        set_parsed(&get, "HEALTH_TIMEOUT_SEC", &mut h.timeout_secs, |v| v.parse().ok());

        // --- feed ---
        let f = &mut self.feed;
        if let Some(v) = get("STATUS_FEED_URL") {
            f.url = Some(v);
        }
        set_parsed(&get, "STATUS_POLL_SEC", &mut f.poll_secs, |v| v.parse().ok());
        if let Some(v) = get("STATUS_STATE_PATH") {
            f.state_path = PathBuf::from(v);
        }
        set_parsed(&get, "STATUS_MAX_PER_POLL", &mut f.max_per_poll, |v| v.parse().ok());
        set_parsed(&get, "STATUS_COOLDOWN_SEC", &mut f.cooldown_secs, |v| v.parse().ok());
        set_parsed(&get, "STATUS_BOOT_IGNORE_HISTORY", &mut f.boot_ignore_history, parse_bool);
        set_parsed(&get, "STATUS_SEND_LAST_ON_BOOT", &mut f.send_last_on_boot, parse_bool);
        set_parsed(&get, "STATUS_SKIP_ANALYTICS", &mut f.skip_analytics, parse_bool);
        set_parsed(&get, "STATUS_SEEN_CAP", &mut f.seen_cap, |v| v.parse().ok());
        set_parsed(&get, "STATUS_TIMEOUT_SEC", &mut f.timeout_secs, |v| v.parse().ok());
        if let Some(only) = get("STATUS_ONLY_INCIDENTS").and_then(|v| parse_bool(&v)) {
            f.allowed_categories = if only {
                Category::DEFAULT_ALLOWED.to_vec()
            } else {
                Category::ALL.to_vec()
            };
        }
        if let Some(list) = get("STATUS_CATEGORIES") {
            f.allowed_categories = parse_categories(&list);
        }

        // --- display ---
        let d = &mut self.display;
        if let Some(he) = get("STATUS_HEBREW").and_then(|v| parse_bool(&v)) {
            d.locale = if he { Locale::He } else { Locale::En };
        }
        set_parsed(&get, "STATUS_LOCALE", &mut d.locale, |v| v.parse().ok());
        if let Some(v) = get("STATUS_TZ") {
            d.tz_label = v;
        }
        if let Some(v) = get("STATUS_UTC_OFFSET") {
            d.utc_offset = v;
        }
        set_parsed(&get, "STATUS_INCLUDE_SUMMARY", &mut d.include_summary, parse_bool);

        // --- notify ---
        let n = &mut self.notify;
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            n.telegram_bot_token = Some(v);
        }
        if let Some(v) = get("CHAT_ID").or_else(|| get("TELEGRAM_CHAT_ID")) {
            n.telegram_chat_id = Some(v);
        }
        if let Some(v) = get("TELEGRAM_API_BASE") {
            n.telegram_api_base = v;
        }
        if let Some(v) = get("DISCORD_WEBHOOK_URL") {
            n.discord_webhook_url = Some(v);
        }
        if let Some(v) = get("SLACK_WEBHOOK_URL") {
            n.slack_webhook_url = Some(v);
        }
        if let (Some(host), Some(user), Some(pass), Some(from), Some(to)) = (
            get("SMTP_HOST"),
            get("SMTP_USER"),
            get("SMTP_PASS"),
            get("NOTIFY_EMAIL_FROM"),
            get("NOTIFY_EMAIL_TO"),
        ) {
            n.email = Some(EmailConfig {
                host,
                user,
                pass,
                from,
                to,
                subject_prefix: get("NOTIFY_EMAIL_SUBJECT_PREFIX")
                    .unwrap_or_else(default_subject_prefix),
            });
        }
        set_parsed(&get, "NOTIFY_TIMEOUT_SEC", &mut n.timeout_secs, |v| v.parse().ok());
        set_parsed(&get, "STARTUP_MESSAGE", &mut n.startup_message, parse_bool);
        set_parsed(&get, "COMMANDS_ENABLED", &mut n.commands_enabled, parse_bool);
        set_parsed(&get, "COMMAND_POLL_SEC", &mut n.command_poll_secs, |v| v.parse().ok());

        // --- ledger ---
        let l = &mut self.ledger;
        if let Some(v) = get("ACTIVITY_LEDGER_PATH") {
            l.path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SERVICE_ID") {
            l.service_id = v;
        }
        if let Some(v) = get("SERVICE_NAME") {
            l.service_name = Some(v);
        }
    }

    /// Clamp values that would stall or break the loops.
    pub fn sanitize(&mut self) {
        let h = &mut self.health;
        h.interval_secs = h.interval_secs.max(1);
        h.down_fails_min = h.down_fails_min.max(1);
        h.back_succ_min = h.back_succ_min.max(1);
        h.timeout_secs = h.timeout_secs.max(1);
        h.targets.retain(|t| !t.url.trim().is_empty());

        let f = &mut self.feed;
        f.url = f.url.take().map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        f.poll_secs = f.poll_secs.max(1);
        f.max_per_poll = f.max_per_poll.max(1);
        f.cooldown_secs = f.cooldown_secs.max(0);
        f.seen_cap = f.seen_cap.max(1);
        f.timeout_secs = f.timeout_secs.max(1);
        f.allowed_categories.dedup();

        self.notify.timeout_secs = self.notify.timeout_secs.max(1);
        self.notify.command_poll_secs = self.notify.command_poll_secs.clamp(1, 50);
    }
}

fn set_parsed<G, T, P>(get: &G, key: &str, slot: &mut T, parse: P)
where
    G: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    if let Some(raw) = get(key) {
        match parse(&raw) {
            Some(v) => *slot = v,
            None => tracing::warn!(key, value = %raw, "ignoring unparsable config value"),
        }
    }
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_categories(s: &str) -> Vec<Category> {
    let mut out = Vec::new();
    for name in split_list(s) {
        match name.parse::<Category>() {
            Ok(c) if !out.contains(&c) => out.push(c),
            Ok(_) => {}
            Err(e) => tracing::warn!("STATUS_CATEGORIES: {e}"),
        }
    }
    out
}

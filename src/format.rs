// src/format.rs
//! User-facing message text for both pipelines (English / Hebrew).

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::config::DisplayConfig;
use crate::feed::{Category, FeedEntry};
use crate::health::{Transition, Verdict};
use crate::state::StatusSnapshot;

const SUMMARY_MAX_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    He,
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Locale::En),
            "he" | "iw" | "hebrew" => Ok(Locale::He),
            other => anyhow::bail!("unsupported locale '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageFormatter {
    locale: Locale,
    tz_label: String,
    offset: FixedOffset,
    include_summary: bool,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::from_config(&DisplayConfig::default())
    }
}

impl MessageFormatter {
    pub fn from_config(cfg: &DisplayConfig) -> Self {
        let offset = parse_offset(&cfg.utc_offset).unwrap_or_else(|| {
            tracing::warn!(offset = %cfg.utc_offset, "invalid STATUS_UTC_OFFSET, using UTC");
            utc_offset()
        });
        Self {
            locale: cfg.locale,
            tz_label: cfg.tz_label.clone(),
            offset,
            include_summary: cfg.include_summary,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn local_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }

    fn category_label(&self, c: Category) -> &'static str {
        match (self.locale, c) {
            (Locale::He, Category::Resolved) => "✅ התקלה נפתרה",
            (Locale::He, Category::Monitoring) => "🟡 במעקב",
            (Locale::He, Category::Incident) => "🔴 נחקרת תקלה",
            (Locale::He, _) => "🔔 עדכון",
            (Locale::En, Category::Resolved) => "✅ Resolved",
            (Locale::En, Category::Monitoring) => "🟡 Monitoring",
            (Locale::En, Category::Incident) => "🔴 Incident",
            (Locale::En, _) => "🔔 Update",
        }
    }

    /// Concise feed notification: header, label + title, local time, link, optional summary.
    pub fn feed_entry(&self, e: &FeedEntry) -> String {
        let header = match self.locale {
            Locale::He => "📡 עדכון סטטוס:",
            Locale::En => "📡 Status update:",
        };
        let mut parts = vec![
            header.to_string(),
            format!("{}: {}", self.category_label(e.category), e.title)
                .trim()
                .to_string(),
            format!("🕒 {} ({})", self.local_time(e.published), self.tz_label),
        ];
        if !e.link.is_empty() {
            parts.push(format!("🔗 {}", e.link));
        }
        if self.include_summary && !e.body.is_empty() {
            parts.push(format!("— {}", truncate(&e.body, SUMMARY_MAX_CHARS)));
        }
        parts.join("\n")
    }

    pub fn health_transition(&self, service: &str, t: &Transition) -> String {
        match (self.locale, t) {
            (Locale::En, Transition::Down { fail_streak, .. }) => format!(
                "❌ {service} is NOT responding ({fail_streak} failed checks in a row)"
            ),
            (Locale::En, Transition::Up { stable_for, .. }) => format!(
                "✅ {service} is RESPONDING (stable for {} min)",
                stable_for.num_minutes()
            ),
            (Locale::He, Transition::Down { fail_streak, .. }) => {
                format!("❌ {service} לא מגיב ({fail_streak} בדיקות כושלות ברצף)")
            }
            (Locale::He, Transition::Up { stable_for, .. }) => format!(
                "✅ {service} מגיב שוב (יציב {} דק׳)",
                stable_for.num_minutes()
            ),
        }
    }

    pub fn startup(&self, service: &str) -> String {
        match self.locale {
            Locale::En => format!("🤖 status monitor started, watching {service}"),
            Locale::He => format!("🤖 מוניטור הסטטוס הופעל, עוקב אחרי {service}"),
        }
    }

    fn verdict_label(&self, v: Verdict) -> &'static str {
        match (self.locale, v) {
            (Locale::En, Verdict::Up) => "✅ UP",
            (Locale::En, Verdict::Down) => "❌ DOWN",
            (Locale::En, Verdict::Unknown) => "❔ unknown",
            (Locale::He, Verdict::Up) => "✅ מגיב",
            (Locale::He, Verdict::Down) => "❌ לא מגיב",
            (Locale::He, Verdict::Unknown) => "❔ לא ידוע",
        }
    }

    /// Reply to the `status` command.
    pub fn status_report(&self, s: &StatusSnapshot) -> String {
        let never = match self.locale {
            Locale::En => "never",
            Locale::He => "אף פעם",
        };
        let when = |t: Option<DateTime<Utc>>| {
            t.map(|t| format!("{} ({})", self.local_time(t), self.tz_label))
                .unwrap_or_else(|| never.to_string())
        };
        let h = &s.health;
        let f = &s.feed;
        let mut lines = match self.locale {
            Locale::En => vec![
                format!("📊 {}: {}", s.service, self.verdict_label(h.verdict)),
                format!("streaks: {} ok / {} failed", h.success_streak, h.fail_streak),
                format!("last check: {}", when(h.last_check_at)),
                format!("monitoring: {}", if s.paused { "⏸ paused" } else { "▶️ active" }),
            ],
            Locale::He => vec![
                format!("📊 {}: {}", s.service, self.verdict_label(h.verdict)),
                format!("רצפים: {} תקינות / {} כושלות", h.success_streak, h.fail_streak),
                format!("בדיקה אחרונה: {}", when(h.last_check_at)),
                format!("ניטור: {}", if s.paused { "⏸ מושהה" } else { "▶️ פעיל" }),
            ],
        };
        if f.url.is_some() {
            match self.locale {
                Locale::En => {
                    lines.push(format!("feed polled: {}", when(f.last_poll_at)));
                    lines.push(format!("feed notifications: {}", f.delivered_total));
                }
                Locale::He => {
                    lines.push(format!("משיכת פיד אחרונה: {}", when(f.last_poll_at)));
                    lines.push(format!("התראות פיד: {}", f.delivered_total));
                }
            }
            if let Some(err) = &f.last_error {
                lines.push(format!("⚠️ {}", truncate(err, SUMMARY_MAX_CHARS)));
            }
        }
        lines.join("\n")
    }

    /// Reply to `pause`/`resume`; `changed` is false when already in that state.
    pub fn pause_ack(&self, paused: bool, changed: bool) -> String {
        match (self.locale, paused, changed) {
            (Locale::En, true, true) => "⏸ Health monitoring paused".into(),
            (Locale::En, true, false) => "⏸ Already paused".into(),
            (Locale::En, false, true) => "▶️ Health monitoring resumed".into(),
            (Locale::En, false, false) => "▶️ Already running".into(),
            (Locale::He, true, true) => "⏸ הניטור הושהה".into(),
            (Locale::He, true, false) => "⏸ הניטור כבר מושהה".into(),
            (Locale::He, false, true) => "▶️ הניטור חודש".into(),
            (Locale::He, false, false) => "▶️ הניטור כבר פעיל".into(),
        }
    }

    /// Reply to `now`: one immediate probe, outside the debouncer.
    pub fn probe_now(&self, service: &str, ok: bool) -> String {
        match (self.locale, ok) {
            (Locale::En, true) => format!("✅ {service} answered the check just now"),
            (Locale::En, false) => format!("❌ {service} failed the check just now"),
            (Locale::He, true) => format!("✅ {service} ענה לבדיקה עכשיו"),
            (Locale::He, false) => format!("❌ {service} נכשל בבדיקה עכשיו"),
        }
    }

    pub fn unavailable(&self, what: &str) -> String {
        match self.locale {
            Locale::En => format!("ℹ️ {what}: not available"),
            Locale::He => format!("ℹ️ {what}: לא זמין"),
        }
    }

    pub fn help(&self) -> String {
        match self.locale {
            Locale::En => "Commands: /status /pause /resume /now /last".into(),
            Locale::He => "פקודות: /status /pause /resume /now /last".into(),
        }
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parse `+HH:MM`, `-HHMM`, `+H` or `Z`.
pub fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.chars().next()? {
        '+' => (1, &s[1..]),
        '-' => (-1, &s[1..]),
        _ => (1, s),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hh, mm) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hh > 14 || mm > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hh * 3600 + mm * 60))
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

// src/feed/classify.rs
//! Entry classification: maps title + body text onto a coarse incident category
//! and flags analytics-only noise.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Incident,
    Resolved,
    Monitoring,
    Update,
    Other,
}

impl Category {
    /// Categories delivered when nothing else is configured.
    pub const DEFAULT_ALLOWED: [Category; 3] =
        [Category::Incident, Category::Resolved, Category::Monitoring];

    pub const ALL: [Category; 5] = [
        Category::Incident,
        Category::Resolved,
        Category::Monitoring,
        Category::Update,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Incident => "incident",
            Category::Resolved => "resolved",
            Category::Monitoring => "monitoring",
            Category::Update => "update",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incident" => Ok(Category::Incident),
            "resolved" => Ok(Category::Resolved),
            "monitoring" => Ok(Category::Monitoring),
            "update" => Ok(Category::Update),
            "other" => Ok(Category::Other),
            other => anyhow::bail!("unknown category '{other}'"),
        }
    }
}

struct Vocab {
    resolved: Regex,
    monitoring: Regex,
    incident: Regex,
    update: Regex,
}

fn vocab() -> &'static Vocab {
    static VOCAB: OnceCell<Vocab> = OnceCell::new();
    VOCAB.get_or_init(|| Vocab {
        resolved: Regex::new(r"(?i)\b(resolved|fixed|restored)\b").expect("resolved regex"),
        monitoring: Regex::new(r"(?i)\b(monitoring|observing)\b").expect("monitoring regex"),
        incident: Regex::new(
            r"(?i)\b(investigating|degraded|degradation|partial outage|incident|outage)\b",
        )
        .expect("incident regex"),
        update: Regex::new(r"(?i)\b(identified|mitigating|recovering|update)\b")
            .expect("update regex"),
    })
}

/// Classify by vocabulary, first match wins:
/// resolved > monitoring > incident > update > other.
pub fn classify(title: &str, body: &str) -> Category {
    let text = format!("{title} {body}");
    let v = vocab();
    if v.resolved.is_match(&text) {
        Category::Resolved
    } else if v.monitoring.is_match(&text) {
        Category::Monitoring
    } else if v.incident.is_match(&text) {
        Category::Incident
    } else if v.update.is_match(&text) {
        Category::Update
    } else {
        Category::Other
    }
}

/// Coarse substring check; also matches "analytics", "Analytical" etc.
pub fn is_analytics(title: &str, body: &str) -> bool {
    title.to_lowercase().contains("analytic") || body.to_lowercase().contains("analytic")
}

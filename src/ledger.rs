// src/ledger.rs
//! Interaction ledger: who talked to the bot, how often, and when.
//!
//! Recording is best-effort; callers log a failure and move on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::config::LedgerConfig;

#[async_trait]
pub trait ActivityLedger: Send + Sync {
    async fn record_activity(&self, actor_id: &str) -> Result<()>;
}

/// Ledger that records nothing (no path configured).
pub struct NoopLedger;

#[async_trait]
impl ActivityLedger for NoopLedger {
    async fn record_activity(&self, _actor_id: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInteraction {
    pub service_id: String,
    pub user_id: String,
    pub interaction_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceActivity {
    pub service_name: String,
    pub last_user_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDoc {
    /// Keyed by `"{service_id}:{user_id}"`.
    #[serde(default)]
    pub users: BTreeMap<String, UserInteraction>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceActivity>,
}

impl LedgerDoc {
    pub fn upsert(&mut self, service_id: &str, service_name: &str, user_id: &str, now: DateTime<Utc>) {
        let key = format!("{service_id}:{user_id}");
        let u = self.users.entry(key).or_insert_with(|| UserInteraction {
            service_id: service_id.to_string(),
            user_id: user_id.to_string(),
            interaction_count: 0,
            created_at: now,
            last_interaction: now,
        });
        u.interaction_count += 1;
        u.last_interaction = now;

        let s = self
            .services
            .entry(service_id.to_string())
            .or_insert_with(|| ServiceActivity {
                service_name: service_name.to_string(),
                last_user_activity: now,
                created_at: now,
                updated_at: now,
            });
        s.service_name = service_name.to_string();
        s.last_user_activity = now;
        s.updated_at = now;
    }

    pub fn user(&self, service_id: &str, user_id: &str) -> Option<&UserInteraction> {
        self.users.get(&format!("{service_id}:{user_id}"))
    }
}

/// JSON document on local disk, read-modify-write under a lock.
pub struct JsonFileLedger {
    path: PathBuf,
    service_id: String,
    service_name: String,
    lock: Mutex<()>,
}

impl JsonFileLedger {
    pub fn new(path: impl Into<PathBuf>, service_id: impl Into<String>, service_name: Option<String>) -> Self {
        let service_id = service_id.into();
        Self {
            path: path.into(),
            service_name: service_name.unwrap_or_else(|| service_id.clone()),
            service_id,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> LedgerDoc {
        match fs::read_to_string(&self.path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(target: "ledger", path = %self.path.display(), "corrupt ledger, starting empty: {e}");
                LedgerDoc::default()
            }),
            Err(_) => LedgerDoc::default(),
        }
    }

    async fn store(&self, doc: &LedgerDoc) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let body = serde_json::to_vec_pretty(doc).context("serializing ledger")?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming into {}", self.path.display()))
    }

    pub async fn record_at(&self, actor_id: &str, now: DateTime<Utc>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await;
        doc.upsert(&self.service_id, &self.service_name, actor_id, now);
        self.store(&doc).await
    }
}

#[async_trait]
impl ActivityLedger for JsonFileLedger {
    async fn record_activity(&self, actor_id: &str) -> Result<()> {
        self.record_at(actor_id, Utc::now()).await
    }
}

pub fn from_config(cfg: &LedgerConfig) -> Arc<dyn ActivityLedger> {
    match &cfg.path {
        Some(path) => Arc::new(JsonFileLedger::new(
            path.clone(),
            cfg.service_id.clone(),
            cfg.service_name.clone(),
        )),
        None => Arc::new(NoopLedger),
    }
}

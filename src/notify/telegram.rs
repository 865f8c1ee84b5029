// src/notify/telegram.rs
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Notifier;
use crate::config::NotifyConfig;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API client: `sendMessage` for notifications, `getUpdates` for inbound commands.
#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    token: String,
    chat_id: String,
    client: Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            chat_id,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// `None` unless both the bot token and the chat id are configured.
    pub fn from_config(cfg: &NotifyConfig) -> Option<Self> {
        let token = cfg.telegram_bot_token.as_deref()?.trim();
        let chat_id = cfg.telegram_chat_id.as_deref()?.trim();
        if token.is_empty() || chat_id.is_empty() {
            return None;
        }
        Some(
            Self::new(token.to_string(), chat_id.to_string())
                .with_api_base(cfg.telegram_api_base.clone())
                .with_timeout(cfg.timeout_secs),
        )
    }

    pub fn with_api_base(mut self, base: String) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Send `text` to an explicit chat (command replies go back to the sender's chat).
    pub async fn send_to(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = SendMessage {
            chat_id,
            text,
            disable_web_page_preview: true,
        };
        let rsp = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("telegram sendMessage")?;
        let status = rsp.status();
        if !status.is_success() {
            let detail = rsp.text().await.unwrap_or_default();
            return Err(anyhow!("telegram sendMessage HTTP {status}: {detail}"));
        }
        Ok(())
    }

    /// Long-poll for inbound updates. The HTTP timeout is padded past the
    /// server-side `poll_secs` so an idle poll is not reported as an error.
    pub async fn get_updates(&self, offset: Option<i64>, poll_secs: u64) -> Result<Vec<Update>> {
        let mut query: Vec<(&str, String)> = vec![("timeout", poll_secs.to_string())];
        if let Some(off) = offset {
            query.push(("offset", off.to_string()));
        }
        let rsp: ApiResponse<Vec<Update>> = self
            .client
            .get(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(poll_secs) + self.timeout)
            .query(&query)
            .send()
            .await
            .context("telegram getUpdates")?
            .json()
            .await
            .context("telegram getUpdates body")?;
        if !rsp.ok {
            return Err(anyhow!(
                "telegram getUpdates rejected: {}",
                rsp.description.unwrap_or_default()
            ));
        }
        Ok(rsp.result.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        self.send_to(&self.chat_id, text).await
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

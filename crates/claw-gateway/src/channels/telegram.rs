//! Telegram Bot API bridge.
//!
//! Long-polls the bot for messages and relays them to the gateway over
//! HTTP, one session per chat. `/allow <tool>` approves a tool directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use claw_agent::ApprovalStore;
use claw_types::config::ClawConfig;
use claw_types::protocol::SendRequest;

use crate::server::{PASSWORD_HEADER, TOKEN_HEADER};

const TELEGRAM_API: &str = "https://api.telegram.org";
const MESSAGE_LIMIT: usize = 4096;
const LONG_POLL_SECS: u64 = 30;
pub const CHANNEL: &str = "telegram";

// ── Telegram API types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    from: Option<TgUser>,
    chat: TgChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

/// The running bridge.
pub struct TelegramBridge {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    poll_interval: Duration,
    allow_from: Vec<i64>,
    agent_id: String,
    gateway_url: String,
    gateway_token: String,
    gateway_password: String,
    approvals: ApprovalStore,
}

impl TelegramBridge {
    pub fn from_config(config: &ClawConfig) -> Result<Self> {
        let tg = config
            .telegram
            .as_ref()
            .context("No [telegram] section in config")?;
        let agent_id = match &tg.agent_id {
            Some(id) => id.clone(),
            None => config
                .agents
                .first()
                .map(|a| a.id.clone())
                .context("No agents configured")?,
        };
        Ok(Self {
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API.to_string(),
            bot_token: tg.bot_token.clone(),
            poll_interval: Duration::from_secs(tg.poll_interval_secs),
            allow_from: tg.allow_from.clone(),
            agent_id,
            gateway_url: format!("http://{}:{}", config.gateway.host, config.gateway.port),
            gateway_token: config.gateway.token.clone(),
            gateway_password: config.gateway.password.clone(),
            approvals: ApprovalStore::new(config.tools.approvals_path.clone()),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Poll forever, relaying each message.
    pub async fn run(&self) -> Result<()> {
        let mut offset: i64 = 0;
        info!("Telegram bridge started (agent={}, gateway={})", self.agent_id, self.gateway_url);

        loop {
            match self.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = update.update_id + 1;
                        let Some(msg) = update.message else { continue };
                        let user_id = msg.from.as_ref().map(|u| u.id).unwrap_or(0);
                        let text = msg.text.unwrap_or_default();
                        if text.is_empty() {
                            continue;
                        }
                        if let Some(reply) = self.handle_text(msg.chat.id, user_id, &text).await {
                            if let Err(e) = self.send_message(msg.chat.id, &reply).await {
                                error!("Telegram send error: {e:#}");
                            }
                        }
                    }
                }
                Err(e) => warn!("Telegram polling error: {e:#}"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Produce the reply for one incoming text, or `None` to stay silent.
    pub async fn handle_text(&self, chat_id: i64, user_id: i64, text: &str) -> Option<String> {
        if !self.allow_from.is_empty() && !self.allow_from.contains(&user_id) {
            debug!("Telegram: ignoring message from unauthorized user {user_id}");
            return None;
        }

        if let Some(tool) = text.strip_prefix("/allow ") {
            let tool = tool.trim();
            if tool.is_empty() {
                return Some("Usage: /allow <tool>".to_string());
            }
            return Some(match self.approvals.allow(tool) {
                Ok(()) => format!("Approved tool {tool}"),
                Err(e) => format!("Failed to approve {tool}: {e:#}"),
            });
        }

        Some(match self.relay(chat_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Telegram relay failed: {e:#}");
                format!("{e:#}")
            }
        })
    }

    /// Post to the gateway; the reply text, or the gateway's error string.
    async fn relay(&self, chat_id: i64, text: &str) -> Result<String> {
        let req = SendRequest {
            agent_id: self.agent_id.clone(),
            message: text.to_string(),
            session_id: None,
            channel: CHANNEL.to_string(),
            peer: chat_id.to_string(),
        };
        let body: serde_json::Value = self
            .client
            .post(format!("{}/api/session/send", self.gateway_url))
            .header(TOKEN_HEADER, &self.gateway_token)
            .header(PASSWORD_HEADER, &self.gateway_password)
            .json(&req)
            .send()
            .await
            .context("Failed to reach gateway")?
            .json()
            .await
            .context("Malformed gateway response")?;

        if body["ok"].as_bool() == Some(true) {
            Ok(body["assistant_message"].as_str().unwrap_or_default().to_string())
        } else {
            Ok(body["error"].as_str().unwrap_or("unknown error").to_string())
        }
    }

    // ── API calls ───────────────────────────────────────────────────────

    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>> {
        let url = format!("{}/bot{}/getUpdates", self.api_base, self.bot_token);
        let resp: TgResponse<Vec<TgUpdate>> = self
            .client
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .send()
            .await?
            .json()
            .await?;

        if !resp.ok {
            anyhow::bail!("Telegram API error: {}", resp.description.unwrap_or_default());
        }
        Ok(resp.result.unwrap_or_default())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        for chunk in split_message(text, MESSAGE_LIMIT) {
            let params = serde_json::json!({ "chat_id": chat_id, "text": chunk });
            let resp: TgResponse<serde_json::Value> =
                self.client.post(&url).json(&params).send().await?.json().await?;
            if !resp.ok {
                anyhow::bail!("sendMessage failed: {}", resp.description.unwrap_or_default());
            }
        }
        Ok(())
    }
}

/// Split into chunks of at most `max_len` bytes, preferring newline
/// boundaries and never splitting a character.
fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if text.len() <= max_len {
        return vec![text];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let split_at = if end < text.len() {
            text[start..end].rfind('\n').map(|i| start + i + 1).unwrap_or(end)
        } else {
            end
        };
        chunks.push(&text[start..split_at]);
        start = split_at;
    }
    chunks
}

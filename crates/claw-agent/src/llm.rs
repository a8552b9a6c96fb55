use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use claw_types::config::{AgentConfig, LlmConfig, ProviderEndpoint};
use claw_types::error::ClawError;

// ─── Message types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    Human,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Ai,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// What the model answered: reply text, optionally with one tool request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tool: Option<ToolCall>,
}

impl ModelReply {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tool: None,
        }
    }

    pub fn tool_call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            message: String::new(),
            tool: Some(ToolCall {
                name: name.into(),
                args,
            }),
        }
    }
}

/// A language model, seen as messages in and one reply out.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<ModelReply>;
}

// ─── OpenAI-compatible backend ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    response_format: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client that asks for a JSON reply shaped like
/// [`ModelReply`].
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    tool_defs: Vec<serde_json::Value>,
}

impl OpenAiBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            tool_defs: vec![],
        }
    }

    /// Describe these tools to the model on every request.
    pub fn with_tools(mut self, defs: Vec<serde_json::Value>) -> Self {
        self.tool_defs = defs;
        self
    }

    fn format_instructions(&self) -> String {
        let mut text = String::from(
            "Reply with a single JSON object of the form \
             {\"message\": string, \"tool\": null | {\"name\": string, \"args\": object}}. \
             Set \"tool\" only when you need to run one of the tools below; \
             otherwise put your full answer in \"message\".",
        );
        if !self.tool_defs.is_empty() {
            text.push_str("\n\nAvailable tools:");
            for def in &self.tool_defs {
                text.push_str(&format!(
                    "\n- {}: {} Arguments schema: {}",
                    def["name"].as_str().unwrap_or_default(),
                    def["description"].as_str().unwrap_or_default(),
                    def["input_schema"],
                ));
            }
        }
        text
    }

    fn wire_messages<'a>(&self, messages: &'a [ChatMessage], instructions: &'a str) -> Vec<WireMessage<'a>> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        let mut inserted = false;
        for (i, m) in messages.iter().enumerate() {
            wire.push(WireMessage {
                role: match m.role {
                    ChatRole::System => "system",
                    ChatRole::Human => "user",
                    ChatRole::Ai => "assistant",
                },
                content: &m.content,
            });
            if i == 0 && m.role == ChatRole::System {
                wire.push(WireMessage {
                    role: "system",
                    content: instructions,
                });
                inserted = true;
            }
        }
        if !inserted {
            wire.insert(
                0,
                WireMessage {
                    role: "system",
                    content: instructions,
                },
            );
        }
        wire
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<ModelReply> {
        let instructions = self.format_instructions();
        let body = CompletionRequest {
            model: &self.model,
            messages: self.wire_messages(messages, &instructions),
            response_format: serde_json::json!({ "type": "json_object" }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to send request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClawError::Transport(format!("model API error ({status}): {body}")).into());
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse model API response")?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!("model replied with {} chars", content.len());
        Ok(parse_reply(&content))
    }
}

/// Interpret completion text as a [`ModelReply`]; anything that isn't the
/// expected JSON object is treated as plain reply text.
pub fn parse_reply(content: &str) -> ModelReply {
    match serde_json::from_str::<ModelReply>(content.trim()) {
        Ok(reply) => reply,
        Err(_) => ModelReply::text(content),
    }
}

/// Build the backend an agent's provider tag selects.
pub fn backend_for(agent: &AgentConfig, llm: &LlmConfig) -> OpenAiBackend {
    let local = match agent.provider.as_str() {
        "local" if llm.local.is_none() => {
            warn!(
                "Agent {} uses provider 'local' but no local endpoint is configured; using openai",
                agent.id
            );
            None
        }
        "local" => llm.local.as_ref(),
        "openai" => None,
        other => {
            warn!("Agent {} has unknown provider '{}'; using openai", agent.id, other);
            None
        }
    };
    let (endpoint, api_key): (&ProviderEndpoint, Option<String>) = match local {
        Some(local) => (local, local.api_key.clone()),
        None => (
            &llm.openai,
            std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .or_else(|| llm.openai.api_key.clone()),
        ),
    };
    OpenAiBackend::new(endpoint.base_url.clone(), api_key, agent.model.clone())
}

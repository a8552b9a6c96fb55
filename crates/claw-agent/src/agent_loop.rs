use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};

use claw_types::event::Event;

use crate::llm::{ChatMessage, ModelBackend};
use crate::tools::{ToolError, ToolRegistry};

/// Where a turn records the tool events it produces.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event) -> Result<()>;
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Final assistant text; `tool` names the tool run along the way, if any.
    Reply { text: String, tool: Option<String> },
    /// The requested tool is not approved; `text` tells the user how to fix that.
    ApprovalBlocked { tool: String, text: String },
}

impl TurnOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Reply { text, .. } | Self::ApprovalBlocked { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Reply { text, .. } | Self::ApprovalBlocked { text, .. } => text,
        }
    }
}

/// Message shown when a tool call is blocked by the approval gate.
pub fn approval_message(tool: &str) -> String {
    format!(
        "Tool '{tool}' requires approval. Approve via CLI 'claw tools allow {tool}', \
         Telegram '/allow {tool}', or the web UI."
    )
}

fn tool_summary(tool: &str, result: &serde_json::Value) -> String {
    format!("Tool {tool}: {result}")
}

/// Turn stored history plus the new user message into the model's input.
pub fn build_messages(system_prompt: &str, history: &[Event], user_content: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    for event in history {
        messages.push(match event {
            Event::User { content } => ChatMessage::human(content.as_str()),
            Event::Assistant { content } => ChatMessage::ai(content.as_str()),
            Event::Tool { tool, content } => ChatMessage::system(tool_summary(tool, content)),
        });
    }
    messages.push(ChatMessage::human(user_content));
    messages
}

/// Run one conversation turn.
///
/// At most one tool round-trip happens: after a tool runs the model is
/// invoked exactly once more and any further tool request is ignored.
#[allow(clippy::too_many_arguments)]
pub async fn run_turn(
    backend: &dyn ModelBackend,
    registry: &ToolRegistry,
    sink: &dyn EventSink,
    system_prompt: &str,
    history: &[Event],
    user_content: &str,
    channel: &str,
    interactive: bool,
) -> Result<TurnOutcome> {
    let mut messages = build_messages(system_prompt, history, user_content);
    let reply = backend.invoke(&messages).await?;

    let Some(call) = reply.tool else {
        return Ok(TurnOutcome::Reply {
            text: registry.normalize_reply(reply.message),
            tool: None,
        });
    };

    info!("Model requested tool {} (channel={})", call.name, channel);
    let result = match registry
        .execute(&call.name, &call.args, channel, interactive)
        .await
    {
        Ok(value) => value,
        Err(ToolError::ApprovalRequired { tool }) => {
            return Ok(TurnOutcome::ApprovalBlocked {
                text: approval_message(&tool),
                tool,
            });
        }
        Err(e) if e.is_soft() => {
            warn!("Tool {} failed: {}", call.name, e);
            json!({ "ok": false, "error": e.to_string() })
        }
        Err(e) => return Err(e.into()),
    };

    sink.record(&Event::tool(call.name.as_str(), result.clone()))?;
    messages.push(ChatMessage::system(tool_summary(&call.name, &result)));

    let final_reply = backend.invoke(&messages).await?;
    if let Some(ignored) = &final_reply.tool {
        warn!("Ignoring chained tool request {} within one turn", ignored.name);
    }
    Ok(TurnOutcome::Reply {
        text: registry.normalize_reply(final_reply.message),
        tool: Some(call.name),
    })
}

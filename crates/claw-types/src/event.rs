use serde::{Deserialize, Serialize};

/// One immutable entry in a session's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Event {
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    /// Raw result of a tool invocation made during a turn.
    Tool {
        tool: String,
        content: serde_json::Value,
    },
}

impl Event {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, content: serde_json::Value) -> Self {
        Self::Tool {
            tool: tool.into(),
            content,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    /// Text rendering of the event body; tool results are rendered as JSON.
    pub fn content_text(&self) -> String {
        match self {
            Self::User { content } | Self::Assistant { content } => content.clone(),
            Self::Tool { content, .. } => content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            _ => Err(anyhow::anyhow!("unknown role: {}", s)),
        }
    }
}

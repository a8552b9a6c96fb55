pub mod exec;
pub mod file_index;
pub mod file_read;
pub mod file_write;
pub mod paths;
pub mod web_fetch;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use claw_types::config::ToolsConfig;

use crate::approvals::ApprovalStore;
use paths::UserHome;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{tool}' requires approval")]
    ApprovalRequired { tool: String },
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("fetch failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ToolError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid(tool: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgs {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    /// Failures the model should see as an `{ok:false}` result rather
    /// than aborting the turn.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::InvalidArgs { .. } | Self::Io { .. })
    }
}

/// Per-call context handed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub channel: String,
}

/// Tool executor trait, one implementation per tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

/// Asks the operator whether an unapproved tool may run.
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn confirm(&self, tool: &str, channel: &str) -> bool;
}

/// Prompts on the controlling terminal.
pub struct StdinPrompt;

#[async_trait]
impl ApprovalPrompt for StdinPrompt {
    async fn confirm(&self, tool: &str, _channel: &str) -> bool {
        let tool = tool.to_string();
        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            eprint!("Allow tool '{tool}'? [y/N]: ");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return false;
            }
            matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
        })
        .await
        .unwrap_or(false)
    }
}

/// Registry of available tools, gated by the approval store.
pub struct ToolRegistry {
    tools: Vec<Box<dyn ToolExecutor>>,
    approvals: Arc<ApprovalStore>,
    prompt: Arc<dyn ApprovalPrompt>,
    user: Option<UserHome>,
}

impl ToolRegistry {
    pub fn new(approvals: Arc<ApprovalStore>) -> Self {
        Self {
            tools: vec![],
            approvals,
            prompt: Arc::new(StdinPrompt),
            user: None,
        }
    }

    /// Create a registry with `exec`, `file.read`, `file.write` and `web.fetch`.
    pub fn with_default_tools(
        config: &ToolsConfig,
        approvals: Arc<ApprovalStore>,
        user: UserHome,
    ) -> Self {
        let mut reg = Self::new(approvals);
        reg.user = Some(user.clone());
        reg.register(Box::new(exec::Exec::new(
            config.exec_allowlist.clone(),
            Duration::from_secs(config.exec_timeout_secs),
        )));
        reg.register(Box::new(file_read::FileRead::new(user.clone())));
        reg.register(Box::new(file_write::FileWrite::new(user)));
        reg.register(Box::new(web_fetch::WebFetch::new(Duration::from_secs(
            config.fetch_timeout_secs,
        ))));
        reg
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn ApprovalPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn register(&mut self, tool: Box<dyn ToolExecutor>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolExecutor> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn approvals(&self) -> &ApprovalStore {
        &self.approvals
    }

    /// Point superuser app-dir paths in a model reply at the real user.
    pub fn normalize_reply(&self, text: String) -> String {
        match &self.user {
            Some(user) => user.normalize_mentions(&text),
            None => text,
        }
    }

    /// Pass if `tool` is approved; otherwise ask the operator when
    /// `interactive`, persisting a yes.
    pub async fn ensure_approved(
        &self,
        tool: &str,
        channel: &str,
        interactive: bool,
    ) -> Result<(), ToolError> {
        if self.approvals.is_allowed(tool)? {
            return Ok(());
        }
        if interactive && self.prompt.confirm(tool, channel).await {
            self.approvals.allow(tool)?;
            return Ok(());
        }
        warn!("Tool {} blocked pending approval (channel={})", tool, channel);
        Err(ToolError::ApprovalRequired {
            tool: tool.to_string(),
        })
    }

    /// Run `tool` with `args` after the approval gate.
    pub async fn execute(
        &self,
        tool: &str,
        args: &Value,
        channel: &str,
        interactive: bool,
    ) -> Result<Value, ToolError> {
        self.ensure_approved(tool, channel, interactive).await?;
        let Some(executor) = self.get(tool) else {
            return Ok(serde_json::json!({ "ok": false, "error": format!("unknown tool {tool}") }));
        };
        info!("Executing tool: {} (channel={})", tool, channel);
        let ctx = ToolContext {
            channel: channel.to_string(),
        };
        executor.execute(args, &ctx).await
    }

    /// Name/description/schema triples, for describing the tools to a model.
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.input_schema(),
                })
            })
            .collect()
    }
}

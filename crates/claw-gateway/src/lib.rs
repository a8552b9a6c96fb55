pub mod channels;
pub mod client;
pub mod config;
pub mod doctor;
pub mod runtime;
pub mod server;
pub mod store;

pub use client::GatewayClient;
pub use runtime::AgentRuntime;
pub use store::SessionStore;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use claw_agent::ToolError;
use claw_types::{
    config::{AgentConfig, ClawConfig},
    error::ClawError,
    event::Event,
    protocol::{SendRequest, SendResponse},
    session::Session,
};

/// Name reported to clients on connect.
pub const SERVER_NAME: &str = "claw-gateway";

/// The central gateway: owns the session store and agent runtime and
/// serves them to every front-end. HTTP and WebSocket handlers hold an
/// `Arc<Gateway>`.
pub struct Gateway {
    config: Arc<ClawConfig>,
    store: Arc<SessionStore>,
    runtime: Arc<AgentRuntime>,
}

impl Gateway {
    /// Build the store, tool registry and per-agent model backends from
    /// `config`.
    pub fn new(config: ClawConfig) -> Self {
        let store = Arc::new(SessionStore::new(&config.storage));
        let tools = runtime::default_tools(&config);
        let runtime = Arc::new(AgentRuntime::from_config(&config, Arc::clone(&store), tools));
        Self::from_parts(config, store, runtime)
    }

    pub fn from_parts(config: ClawConfig, store: Arc<SessionStore>, runtime: Arc<AgentRuntime>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            runtime,
        }
    }

    pub fn config(&self) -> &ClawConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    /// Both credentials must be present and match exactly.
    pub fn authorize(&self, token: Option<&str>, password: Option<&str>) -> Result<(), ClawError> {
        match (token, password) {
            (Some(t), Some(p)) if t == self.config.gateway.token && p == self.config.gateway.password => Ok(()),
            _ => Err(ClawError::Unauthorized),
        }
    }

    pub fn list_agents(&self) -> Vec<AgentConfig> {
        self.runtime.agents().to_vec()
    }

    fn require_agent(&self, agent_id: &str) -> Result<&AgentConfig> {
        self.runtime
            .agent(agent_id)
            .ok_or_else(|| ClawError::validation(format!("unknown agent {agent_id}")).into())
    }

    pub fn list_sessions(&self, agent_id: &str) -> Result<Vec<Session>> {
        self.require_agent(agent_id)?;
        self.store.list_sessions(agent_id)
    }

    pub fn read_events(&self, agent_id: &str, session_id: &str) -> Result<Vec<Event>> {
        self.require_agent(agent_id)?;
        self.store.read_events(agent_id, session_id)
    }

    /// Resolve the target session, record the user message, run a turn
    /// and record the reply.
    ///
    /// An explicit `session_id` is created on first use; otherwise the
    /// latest session for the `(channel, peer)` pair is reused, or a new
    /// one started.
    pub async fn send(&self, req: &SendRequest) -> Result<SendResponse> {
        self.send_with(req, false).await
    }

    /// Like [`Gateway::send`]; with `interactive` set, tools lacking
    /// approval prompt the operator instead of blocking the turn.
    pub async fn send_with(&self, req: &SendRequest, interactive: bool) -> Result<SendResponse> {
        self.require_agent(&req.agent_id)?;
        let session = {
            let req = req.clone();
            self.with_store(move |store| resolve_session(store, &req)).await?
        };

        self.append(&req.agent_id, &session.id, Event::user(req.message.as_str()))
            .await?;
        let reply = self
            .runtime
            .run_turn(&req.agent_id, &session.id, &req.message, &req.channel, interactive)
            .await?;
        self.append(&req.agent_id, &session.id, Event::assistant(reply.as_str()))
            .await?;

        info!("Turn complete (agent={}, session={})", req.agent_id, session.id);
        Ok(SendResponse {
            session_id: session.id,
            assistant_message: reply,
        })
    }

    async fn append(&self, agent_id: &str, session_id: &str, event: Event) -> Result<()> {
        let (agent_id, session_id) = (agent_id.to_string(), session_id.to_string());
        self.with_store(move |store| store.append_event(&agent_id, &session_id, &event))
            .await
    }

    /// Run blocking store I/O on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SessionStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("Session store task failed")?
    }
}

/// An explicit non-empty `session_id` is ensured; otherwise the latest
/// session for the `(channel, peer)` pair, or a new one.
fn resolve_session(store: &SessionStore, req: &SendRequest) -> Result<Session> {
    if let Some(id) = req.session_id.as_deref().filter(|id| !id.is_empty()) {
        return store.ensure_session(&req.agent_id, id, &req.channel, &req.peer, &req.message);
    }
    match store.find_latest_session(&req.agent_id, &req.channel, &req.peer)? {
        Some(existing) => Ok(existing),
        None => store.create_session(&req.agent_id, &req.channel, &req.peer, &req.message),
    }
}

/// Classify a failure by the first recognizable error in its chain.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ClawError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<ToolError>() {
            return match e {
                ToolError::ApprovalRequired { .. } => "ApprovalRequired",
                ToolError::InvalidArgs { .. } | ToolError::Io { .. } => "ToolExecutionFailure",
                ToolError::Transport(_) => "TransportFailure",
                ToolError::Storage(_) => "StorageFailure",
            };
        }
        if cause.is::<std::io::Error>() || cause.is::<serde_json::Error>() {
            return "StorageFailure";
        }
        if cause.is::<reqwest::Error>() {
            return "TransportFailure";
        }
    }
    "InternalError"
}

/// `"<kind>: <message>"`, as reported to callers.
pub fn describe_error(err: &anyhow::Error) -> String {
    let kind = error_kind(err);
    match kind {
        "TransportFailure" | "StorageFailure" | "InternalError" => {
            warn!("Request failed: {:#}", err);
        }
        _ => {}
    }
    format!("{kind}: {err:#}")
}

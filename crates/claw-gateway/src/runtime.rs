use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use claw_agent::llm::backend_for;
use claw_agent::{EventSink, ModelBackend, ToolRegistry, TurnOutcome, UserHome};
use claw_types::config::{AgentConfig, ClawConfig};
use claw_types::error::ClawError;
use claw_types::event::Event;

use crate::store::SessionStore;

/// Runs agent turns against stored session history.
pub struct AgentRuntime {
    agents: Vec<AgentConfig>,
    backends: HashMap<String, Arc<dyn ModelBackend>>,
    store: Arc<SessionStore>,
    tools: Arc<ToolRegistry>,
}

/// Records a turn's tool events into one session.
struct SessionSink<'a> {
    store: &'a SessionStore,
    agent_id: &'a str,
    session_id: &'a str,
}

impl EventSink for SessionSink<'_> {
    fn record(&self, event: &Event) -> Result<()> {
        self.store.append_event(self.agent_id, self.session_id, event)
    }
}

impl AgentRuntime {
    pub fn new(agents: Vec<AgentConfig>, store: Arc<SessionStore>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            agents,
            backends: HashMap::new(),
            store,
            tools,
        }
    }

    /// One OpenAI-compatible backend per configured agent.
    pub fn from_config(config: &ClawConfig, store: Arc<SessionStore>, tools: Arc<ToolRegistry>) -> Self {
        let mut runtime = Self::new(config.agents.clone(), store, tools);
        let defs = runtime.tools.definitions();
        for agent in &config.agents {
            let backend = backend_for(agent, &config.llm).with_tools(defs.clone());
            runtime.backends.insert(agent.id.clone(), Arc::new(backend));
        }
        runtime
    }

    /// Use `backend` for `agent_id`, replacing any configured one.
    pub fn with_backend(mut self, agent_id: &str, backend: Arc<dyn ModelBackend>) -> Self {
        self.backends.insert(agent_id.to_string(), backend);
        self
    }

    pub fn agents(&self) -> &[AgentConfig] {
        &self.agents
    }

    pub fn agent(&self, agent_id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn and return the assistant text.
    ///
    /// The caller may already have persisted `user_message` as the last
    /// event of the session; it is not repeated in the model input.
    pub async fn run_turn(
        &self,
        agent_id: &str,
        session_id: &str,
        user_message: &str,
        channel: &str,
        interactive: bool,
    ) -> Result<String> {
        let agent = self
            .agent(agent_id)
            .ok_or_else(|| ClawError::validation(format!("unknown agent {agent_id}")))?;
        let backend = self
            .backends
            .get(agent_id)
            .ok_or_else(|| ClawError::validation(format!("no model backend for agent {agent_id}")))?;

        let mut history = {
            let store = Arc::clone(&self.store);
            let (agent_id, session_id) = (agent_id.to_string(), session_id.to_string());
            tokio::task::spawn_blocking(move || store.read_events(&agent_id, &session_id))
                .await
                .context("Session store task failed")??
        };
        if matches!(history.last(), Some(Event::User { content }) if content == user_message) {
            history.pop();
        }

        let sink = SessionSink {
            store: &self.store,
            agent_id,
            session_id,
        };
        info!(
            "Running turn (agent={}, session={}, channel={}, history={})",
            agent_id,
            session_id,
            channel,
            history.len()
        );
        let outcome = claw_agent::run_turn(
            &**backend,
            &self.tools,
            &sink,
            &agent.system_prompt,
            &history,
            user_message,
            channel,
            interactive,
        )
        .await?;
        if let TurnOutcome::ApprovalBlocked { tool, .. } = &outcome {
            info!("Turn in session {} blocked on approval for {}", session_id, tool);
        }
        Ok(outcome.into_text())
    }
}

/// Build the tool registry every front-end shares.
pub fn default_tools(config: &ClawConfig) -> Arc<ToolRegistry> {
    let approvals = Arc::new(claw_agent::ApprovalStore::new(config.tools.approvals_path.clone()));
    Arc::new(ToolRegistry::with_default_tools(
        &config.tools,
        approvals,
        UserHome::current(),
    ))
}

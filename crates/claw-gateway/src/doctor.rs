//! Configuration health checks.

use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::info;

use claw_types::config::ClawConfig;
use claw_types::error::is_valid_id;

/// Every problem found in `config`. Empty means healthy.
pub fn check_config(config: &ClawConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.gateway.token.is_empty() || config.gateway.password.is_empty() {
        problems.push("gateway token and password are required".to_string());
    }
    if config.agents.is_empty() {
        problems.push("at least one agent must be configured".to_string());
    }

    let mut seen = HashSet::new();
    for agent in &config.agents {
        if !is_valid_id(&agent.id) {
            problems.push(format!(
                "agent id '{}' must be ASCII letters, digits, '-', '_' or '.'",
                agent.id
            ));
        }
        if !seen.insert(agent.id.as_str()) {
            problems.push(format!("duplicate agent id '{}'", agent.id));
        }
        if agent.provider == "local" && config.llm.local.is_none() {
            problems.push(format!(
                "agent '{}' uses provider 'local' but [llm.local] is not configured",
                agent.id
            ));
        }
    }

    if let Some(tg) = &config.telegram {
        if tg.bot_token.is_empty() {
            problems.push("telegram.bot_token is empty".to_string());
        }
        if let Some(id) = &tg.agent_id {
            if config.agent(id).is_none() {
                problems.push(format!("telegram.agent_id '{id}' is not a configured agent"));
            }
        }
    }

    problems
}

/// Create the directories the gateway writes into.
pub fn prepare_dirs(config: &ClawConfig) -> Result<()> {
    let storage = &config.storage.base_path;
    std::fs::create_dir_all(storage)
        .with_context(|| format!("Failed to create {}", storage.display()))?;
    if let Some(parent) = config.tools.approvals_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!("Storage ready at {}", storage.display());
    Ok(())
}

/// Check the config and prepare directories. Returns the problems found.
pub fn run(config: &ClawConfig) -> Result<Vec<String>> {
    let problems = check_config(config);
    prepare_dirs(config)?;
    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_types::config::AgentConfig;

    fn agent(id: &str, provider: &str) -> AgentConfig {
        AgentConfig {
            id: id.into(),
            name: id.into(),
            model: "m".into(),
            provider: provider.into(),
            system_prompt: String::new(),
        }
    }

    #[test]
    fn default_config_is_healthy() {
        assert!(check_config(&ClawConfig::with_credentials("t", "p")).is_empty());
    }

    #[test]
    fn reports_every_problem() {
        let mut cfg = ClawConfig::with_credentials("", "p");
        cfg.agents = vec![agent("a", "openai"), agent("a", "local"), agent("../x", "openai")];
        let problems = check_config(&cfg);
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("duplicate agent id 'a'")));
        assert!(problems.iter().any(|p| p.contains("llm.local")));
    }

    #[test]
    fn no_agents_is_a_problem() {
        let mut cfg = ClawConfig::with_credentials("t", "p");
        cfg.agents.clear();
        assert_eq!(check_config(&cfg).len(), 1);
    }

    #[test]
    fn creates_storage_and_approvals_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ClawConfig::with_credentials("t", "p");
        cfg.storage.base_path = dir.path().join("agents");
        cfg.tools.approvals_path = dir.path().join("conf").join("approvals.json");
        assert!(run(&cfg).unwrap().is_empty());
        assert!(dir.path().join("agents").is_dir());
        assert!(dir.path().join("conf").is_dir());
    }
}

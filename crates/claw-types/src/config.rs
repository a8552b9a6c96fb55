use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClawConfig {
    pub gateway: GatewayConfig,
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
}

impl ClawConfig {
    pub fn agent(&self, id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub token: String,
    pub password: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub model: String,
    /// `openai` or `local`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub system_prompt: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub openai: ProviderEndpoint,
    /// Endpoint used by agents whose provider is `local`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<ProviderEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Optional API key stored in config (env var takes priority at runtime).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ProviderEndpoint {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub base_path: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_compact_interval_hours")]
    pub compact_interval_hours: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
            retention_days: default_retention_days(),
            compact_interval_hours: default_compact_interval_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_approvals_path")]
    pub approvals_path: PathBuf,
    /// Command prefixes `exec` may run. Empty means unrestricted.
    #[serde(default)]
    pub exec_allowlist: Vec<String>,
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            approvals_path: default_approvals_path(),
            exec_allowlist: vec![],
            exec_timeout_secs: default_exec_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Agent that receives bridged messages; first configured agent if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// User IDs allowed to interact with the bot. Empty allows everyone.
    #[serde(default)]
    pub allow_from: Vec<i64>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18789
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("~/.claw/agents")
}

fn default_retention_days() -> u32 {
    30
}

fn default_compact_interval_hours() -> u32 {
    24
}

fn default_approvals_path() -> PathBuf {
    PathBuf::from("~/.claw/approvals.json")
}

fn default_exec_timeout_secs() -> u64 {
    300
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_agents() -> Vec<AgentConfig> {
    vec![AgentConfig {
        id: "default".to_string(),
        name: "Default".to_string(),
        model: "gpt-4o-mini".to_string(),
        provider: default_provider(),
        system_prompt: "You are a helpful personal assistant.".to_string(),
    }]
}

impl ClawConfig {
    /// Default configuration with the given gateway credentials.
    pub fn with_credentials(token: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            gateway: GatewayConfig {
                host: default_host(),
                port: default_port(),
                token: token.into(),
                password: password.into(),
                log_level: default_log_level(),
            },
            agents: default_agents(),
            llm: LlmConfig::default(),
            storage: StorageConfig::default(),
            tools: ToolsConfig::default(),
            telegram: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg: ClawConfig = serde_json::from_value(serde_json::json!({
            "gateway": {"token": "t", "password": "p"}
        }))
        .unwrap();
        assert_eq!(cfg.gateway.port, 18789);
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.storage.retention_days, 30);
        assert_eq!(cfg.storage.compact_interval_hours, 24);
        assert!(cfg.tools.exec_allowlist.is_empty());
        assert!(cfg.telegram.is_none());
    }

    #[test]
    fn agent_lookup() {
        let cfg = ClawConfig::with_credentials("t", "p");
        assert!(cfg.agent("default").is_some());
        assert!(cfg.agent("missing").is_none());
    }
}

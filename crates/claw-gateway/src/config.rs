use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use claw_types::config::ClawConfig;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "CLAW_CONFIG";

/// Returns the claw home directory (~/.claw/)
pub fn claw_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claw")
}

/// Returns the default config file path (~/.claw/claw.toml)
pub fn default_config_path() -> PathBuf {
    claw_home().join("claw.toml")
}

/// Config path from an explicit flag, then `CLAW_CONFIG`, then the default.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return expand_home(p);
    }
    match std::env::var(CONFIG_ENV) {
        Ok(p) if !p.is_empty() => expand_home(Path::new(&p)),
        _ => default_config_path(),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Load config from disk, creating a default with fresh credentials if it
/// doesn't exist. Configured paths come back with `~` expanded.
pub fn load_config(path: &Path) -> Result<ClawConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str::<ClawConfig>(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?
    } else {
        let default = ClawConfig::with_credentials(
            Uuid::new_v4().simple().to_string(),
            Uuid::new_v4().simple().to_string(),
        );
        save_config(path, &default)?;
        info!("Wrote default config to {}", path.display());
        default
    };
    config.storage.base_path = expand_home(&config.storage.base_path);
    config.tools.approvals_path = expand_home(&config.tools.approvals_path);
    Ok(config)
}

/// Save config to disk, overwriting the existing file.
pub fn save_config(path: &Path, config: &ClawConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config).context("Failed to serialize config")?;
    claw_types::fs::write_atomic(path, toml_str.as_bytes())
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}

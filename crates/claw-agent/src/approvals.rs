//! Persisted set of tool names the operator has approved.
//!
//! The set is global to the gateway instance and only grows. Backing
//! storage is a small JSON document: `{"allowed": ["exec", ...]}`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApprovalsFile {
    #[serde(default)]
    allowed: BTreeSet<String>,
}

pub struct ApprovalStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ApprovalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current approved set. A missing file is an empty set.
    pub fn load(&self) -> Result<BTreeSet<String>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read approvals from {}", self.path.display()))?;
        let file: ApprovalsFile = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse approvals at {}", self.path.display()))?;
        Ok(file.allowed)
    }

    pub fn is_allowed(&self, tool: &str) -> Result<bool> {
        Ok(self.load()?.contains(tool))
    }

    /// Add `tool` to the approved set. Idempotent.
    pub fn allow(&self, tool: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("approvals lock poisoned"))?;
        let mut allowed = self.load()?;
        if !allowed.insert(tool.to_string()) {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&ApprovalsFile { allowed })
            .context("Failed to serialize approvals")?;
        claw_types::fs::write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write approvals to {}", self.path.display()))?;
        info!("Tool approved: {}", tool);
        Ok(())
    }
}

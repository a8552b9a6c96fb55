//! Index of files written by `file.write`, keyed by absolute path.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const FILE_INDEX_NAME: &str = "FILE_INDEX.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub path: String,
    pub usage: String,
    pub channel: String,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileIndexDoc {
    #[serde(default)]
    files: BTreeMap<String, FileIndexEntry>,
}

pub struct FileIndex {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BTreeMap<String, FileIndexEntry>> {
        Ok(self.read_doc()?.files)
    }

    /// Insert or replace the entry for `file`.
    pub fn record(&self, file: &Path, usage: &str, channel: &str) -> Result<FileIndexEntry> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("file index lock poisoned"))?;
        let mut doc = self.read_doc()?;
        let key = file.to_string_lossy().into_owned();
        let entry = FileIndexEntry {
            path: key.clone(),
            usage: usage.to_string(),
            channel: channel.to_string(),
            last_updated_at: Utc::now(),
        };
        doc.files.insert(key, entry.clone());
        let json = serde_json::to_string_pretty(&doc).context("Failed to serialize file index")?;
        claw_types::fs::write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write file index {}", self.path.display()))?;
        Ok(entry)
    }

    fn read_doc(&self) -> Result<FileIndexDoc> {
        if !self.path.exists() {
            return Ok(FileIndexDoc::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read file index {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse file index {}", self.path.display()))
    }
}

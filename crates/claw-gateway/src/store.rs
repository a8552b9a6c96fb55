//! Durable per-agent session index and append-only event logs.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<agent_id>/sessions/sessions.json      session index
//! <root>/<agent_id>/sessions/<session_id>.jsonl one event per line
//! <root>/<agent_id>/sessions/compaction.json    {"last_run": ...}
//! ```
//!
//! Index writes replace the whole file atomically. Event logs are only
//! ever appended to. Each agent namespace has its own lock; nothing is
//! shared across agents.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use claw_types::config::StorageConfig;
use claw_types::error::{is_valid_id, ClawError};
use claw_types::event::Event;
use claw_types::fs::write_atomic;
use claw_types::session::Session;

const INDEX_FILE: &str = "sessions.json";
const COMPACTION_FILE: &str = "compaction.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CompactionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_run: Option<DateTime<Utc>>,
}

pub struct SessionStore {
    base_path: PathBuf,
    retention: Duration,
    compact_interval: Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            retention: Duration::days(i64::from(config.retention_days)),
            compact_interval: Duration::hours(i64::from(config.compact_interval_hours)),
            locks: DashMap::new(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    // ─── Paths ────────────────────────────────────────────────────────────────

    fn session_dir(&self, agent_id: &str) -> PathBuf {
        self.base_path.join(agent_id).join("sessions")
    }

    fn index_path(&self, agent_id: &str) -> PathBuf {
        self.session_dir(agent_id).join(INDEX_FILE)
    }

    fn compaction_path(&self, agent_id: &str) -> PathBuf {
        self.session_dir(agent_id).join(COMPACTION_FILE)
    }

    fn events_path(&self, agent_id: &str, session_id: &str) -> PathBuf {
        self.session_dir(agent_id).join(format!("{session_id}.jsonl"))
    }

    // ─── Locking & index I/O ──────────────────────────────────────────────────

    fn agent_lock(&self, agent_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load_index(&self, agent_id: &str) -> Result<Vec<Session>> {
        let path = self.index_path(agent_id);
        if !path.exists() {
            return Ok(vec![]);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session index {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse session index {}", path.display()))
    }

    fn save_index(&self, agent_id: &str, sessions: &[Session]) -> Result<()> {
        let path = self.index_path(agent_id);
        let json = serde_json::to_string_pretty(sessions).context("Failed to serialize session index")?;
        write_atomic(&path, json.as_bytes())
            .with_context(|| format!("Failed to write session index {}", path.display()))
    }

    // ─── Sessions ─────────────────────────────────────────────────────────────

    pub fn list_sessions(&self, agent_id: &str) -> Result<Vec<Session>> {
        check_id("agent", agent_id)?;
        self.load_index(agent_id)
    }

    pub fn get_session(&self, agent_id: &str, session_id: &str) -> Result<Option<Session>> {
        check_id("agent", agent_id)?;
        check_id("session", session_id)?;
        Ok(self
            .load_index(agent_id)?
            .into_iter()
            .find(|s| s.id == session_id))
    }

    /// Most recently updated session for an exact `(channel, peer)` pair.
    pub fn find_latest_session(
        &self,
        agent_id: &str,
        channel: &str,
        peer: &str,
    ) -> Result<Option<Session>> {
        check_id("agent", agent_id)?;
        Ok(self
            .load_index(agent_id)?
            .into_iter()
            .filter(|s| s.matches(channel, peer))
            .max_by_key(|s| s.updated_at))
    }

    /// Create a session under a freshly generated id.
    pub fn create_session(
        &self,
        agent_id: &str,
        channel: &str,
        peer: &str,
        opening_message: &str,
    ) -> Result<Session> {
        check_id("agent", agent_id)?;
        let id = format!("{agent_id}-{}", Uuid::new_v4().simple());
        let lock = self.agent_lock(agent_id);
        let _guard = lock.lock().map_err(|_| poisoned(agent_id))?;

        let mut sessions = self.load_index(agent_id)?;
        let session = Session::new(id, agent_id, channel, peer, opening_message);
        sessions.push(session.clone());
        self.save_index(agent_id, &sessions)?;
        info!("Created session {} (agent={}, channel={}, peer={})", session.id, agent_id, channel, peer);
        Ok(session)
    }

    /// Fetch the session with this id, creating it if absent.
    pub fn ensure_session(
        &self,
        agent_id: &str,
        session_id: &str,
        channel: &str,
        peer: &str,
        opening_message: &str,
    ) -> Result<Session> {
        check_id("agent", agent_id)?;
        check_id("session", session_id)?;
        let lock = self.agent_lock(agent_id);
        let _guard = lock.lock().map_err(|_| poisoned(agent_id))?;

        let mut sessions = self.load_index(agent_id)?;
        if let Some(existing) = sessions.iter().find(|s| s.id == session_id) {
            return Ok(existing.clone());
        }
        let session = Session::new(session_id, agent_id, channel, peer, opening_message);
        sessions.push(session.clone());
        self.save_index(agent_id, &sessions)?;
        info!("Created session {} (agent={}, channel={}, peer={})", session.id, agent_id, channel, peer);
        Ok(session)
    }

    // ─── Events ───────────────────────────────────────────────────────────────

    /// Append one event, bump the session's `updated_at`, then run
    /// compaction if it is due.
    pub fn append_event(&self, agent_id: &str, session_id: &str, event: &Event) -> Result<()> {
        check_id("agent", agent_id)?;
        check_id("session", session_id)?;
        let lock = self.agent_lock(agent_id);
        let _guard = lock.lock().map_err(|_| poisoned(agent_id))?;

        let mut sessions = self.load_index(agent_id)?;
        let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) else {
            return Err(ClawError::validation(format!("unknown session {session_id}")).into());
        };

        let path = self.events_path(agent_id, session_id);
        let mut line = serde_json::to_string(event).context("Failed to serialize event")?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        file.sync_data()
            .with_context(|| format!("Failed to sync {}", path.display()))?;
        debug!("Appended {} event to {}", event.role(), session_id);

        let now = Utc::now();
        session.updated_at = now.max(session.updated_at + Duration::microseconds(1));
        self.save_index(agent_id, &sessions)?;

        self.compact_locked(agent_id, Utc::now())?;
        Ok(())
    }

    /// Events of a session in append order. No log yet means no events.
    pub fn read_events(&self, agent_id: &str, session_id: &str) -> Result<Vec<Event>> {
        check_id("agent", agent_id)?;
        check_id("session", session_id)?;
        let path = self.events_path(agent_id, session_id);
        if !path.exists() {
            return Ok(vec![]);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read event log {}", path.display()))?;
        let mut events = Vec::new();
        for (n, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping malformed line {} in {}: {}", n + 1, path.display(), e),
            }
        }
        Ok(events)
    }

    // ─── Compaction ───────────────────────────────────────────────────────────

    /// Run compaction if it has never run or the last run is older than
    /// the configured interval. Returns the number of sessions removed,
    /// or `None` when it was not due.
    pub fn compact_if_needed(&self, agent_id: &str) -> Result<Option<usize>> {
        self.compact_if_needed_at(agent_id, Utc::now())
    }

    /// [`Self::compact_if_needed`] evaluated as of `now`.
    pub fn compact_if_needed_at(&self, agent_id: &str, now: DateTime<Utc>) -> Result<Option<usize>> {
        check_id("agent", agent_id)?;
        let lock = self.agent_lock(agent_id);
        let _guard = lock.lock().map_err(|_| poisoned(agent_id))?;
        self.compact_locked(agent_id, now)
    }

    fn compact_locked(&self, agent_id: &str, now: DateTime<Utc>) -> Result<Option<usize>> {
        let record_path = self.compaction_path(agent_id);
        let record: CompactionRecord = if record_path.exists() {
            let raw = std::fs::read_to_string(&record_path)
                .with_context(|| format!("Failed to read {}", record_path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", record_path.display()))?
        } else {
            CompactionRecord::default()
        };
        if let Some(last_run) = record.last_run {
            if now - last_run < self.compact_interval {
                return Ok(None);
            }
        }

        let removed = self.compact(agent_id, now)?;

        let json = serde_json::to_string(&CompactionRecord { last_run: Some(now) })
            .context("Failed to serialize compaction record")?;
        write_atomic(&record_path, json.as_bytes())
            .with_context(|| format!("Failed to write {}", record_path.display()))?;
        Ok(Some(removed))
    }

    /// Delete every session whose `updated_at` falls before the retention
    /// window, index entry and log both.
    fn compact(&self, agent_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - self.retention;
        let sessions = self.load_index(agent_id)?;
        let before = sessions.len();
        let (kept, expired): (Vec<Session>, Vec<Session>) =
            sessions.into_iter().partition(|s| s.updated_at >= cutoff);

        for session in &expired {
            let path = self.events_path(agent_id, &session.id);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to delete {}", path.display()));
                }
            }
        }
        if !expired.is_empty() {
            self.save_index(agent_id, &kept)?;
            info!(
                "Compaction removed {} of {} session(s) for agent {}",
                expired.len(),
                before,
                agent_id
            );
        }
        Ok(expired.len())
    }
}

fn poisoned(agent_id: &str) -> anyhow::Error {
    ClawError::Storage(format!("session lock for agent {agent_id} poisoned")).into()
}

fn check_id(what: &str, id: &str) -> Result<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(ClawError::validation(format!("invalid {what} id '{id}'")).into())
    }
}

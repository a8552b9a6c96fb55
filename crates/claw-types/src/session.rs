use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept from the opening message as a title.
pub const TITLE_MAX_CHARS: usize = 80;

/// One conversation thread, scoped to an agent, a channel and a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_id: String,
    /// Originating surface: `cli`, `telegram`, `webui`, ...
    pub channel: String,
    /// Remote correspondent within the channel (chat id, `local`, ...).
    pub peer: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        channel: impl Into<String>,
        peer: impl Into<String>,
        opening_message: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            channel: channel.into(),
            peer: peer.into(),
            title: title_from(opening_message),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn matches(&self, channel: &str, peer: &str) -> bool {
        self.channel == channel && self.peer == peer
    }
}

/// First [`TITLE_MAX_CHARS`] characters of the opening message.
pub fn title_from(message: &str) -> String {
    message.chars().take(TITLE_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_truncated_on_char_boundary() {
        let long = "é".repeat(100);
        let title = title_from(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn new_session_starts_with_equal_timestamps() {
        let s = Session::new("s1", "default", "cli", "local", "hello");
        assert_eq!(s.created_at, s.updated_at);
        assert_eq!(s.title, "hello");
        assert!(s.matches("cli", "local"));
        assert!(!s.matches("telegram", "local"));
    }
}

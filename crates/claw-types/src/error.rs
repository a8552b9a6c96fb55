use thiserror::Error;

/// Conditions the gateway reports to callers as well-formed failures.
#[derive(Debug, Error)]
pub enum ClawError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Storage(String),
}

impl ClawError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable name reported alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::Validation(_) => "ValidationError",
            Self::Transport(_) => "TransportFailure",
            Self::Storage(_) => "StorageFailure",
        }
    }
}

/// Whether `id` is safe to use as a single path component.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

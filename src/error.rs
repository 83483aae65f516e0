//! Error taxonomy shared by the timer, the ledger and the reconciler.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by the remote issue tracker. Displays as the bare message, which is also
/// what gets stored on a worklog that failed to sync.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A timer transition was requested from a state that does not allow it.
    #[error("cannot {transition}: {reason}")]
    InvalidState {
        transition: &'static str,
        reason: &'static str,
    },
    #[error("worklog {id} not found")]
    NotFound { id: i64 },
    #[error("worklog {id} has no remote copy")]
    NotSynced { id: i64 },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("corrupt ledger row: {0}")]
    CorruptRow(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_state(transition: &'static str, reason: &'static str) -> Self {
        Error::InvalidState { transition, reason }
    }
}

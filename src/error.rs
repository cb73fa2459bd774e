use std::path::PathBuf;
use thiserror::Error;

/// Failure classes the controller distinguishes when deciding whether to
/// absorb an error (re-evaluate and let the status reflect reality) or
/// surface it to the user.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("not found: {0:?}")]
    NotFound(PathBuf),

    #[error("hash mismatch for {path:?}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("archive failure: {0}")]
    Archive(String),

    #[error("failed to launch game: {0}")]
    ProcessLaunch(String),
}

impl LauncherError {
    /// Recoverable errors re-enter the state machine via `evaluate()`;
    /// the rest abort the current activation with a user-visible message.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LauncherError::NotFound(_) | LauncherError::IntegrityMismatch { .. }
        )
    }
}

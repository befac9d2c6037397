use thiserror::Error;
use tracing::{error, warn};

/// Error severity, mirrored from the host-facing classification a UI would
/// use to decide how loudly to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Crate-boundary errors.
///
/// Per-source failures inside a session are never allowed to bubble out to a
/// UI layer (spec §7: "the engine never bubbles exceptions to the UI
/// layer"). This enum only surfaces at genuine edges: opening a repository,
/// deserializing a wire response, or a source call a caller chose not to
/// swallow itself.
#[derive(Error, Debug)]
pub enum SuggestError {
    #[error("source '{component}' failed: {message}")]
    Source { component: String, message: String },

    #[error("source '{component}' timed out")]
    Timeout { component: String },

    #[error("shortcut storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to (de)serialize a suggestion payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown query target: {0}")]
    UnknownTarget(String),
}

impl SuggestError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Source { .. } => ErrorSeverity::Warning,
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Storage(_) => ErrorSeverity::Error,
            Self::Serialization(_) => ErrorSeverity::Warning,
            Self::Io(_) => ErrorSeverity::Error,
            Self::UnknownTarget(_) => ErrorSeverity::Critical,
        }
    }
}

pub type Result<T> = std::result::Result<T, SuggestError>;

/// Extension trait for quietly logging and discarding a `Result`.
///
/// Used anywhere a per-source failure must be downgraded to an empty/error
/// `SourceResponse` instead of propagating.
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as a warning (expected/soft failure) and return None.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "operation had a recoverable failure"
                );
                None
            }
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for automation operations.
pub type AutomationResult<T> = Result<T, AutomationError>;

/// Errors that cross component boundaries.
///
/// Transport failures are not represented here: they are absorbed by the
/// transport and surface as `false`/`None`.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Cancellation was requested. Not a failure.
    #[error("stop requested")]
    Stopped,

    #[error("template '{template}' did not appear within {waited:?}")]
    Timeout { template: String, waited: Duration },

    #[error("failed to load template {path:?}: {source}")]
    TemplateLoad {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to decode captured frame: {source}")]
    FrameDecode { source: image::ImageError },

    #[error("invalid joystick direction '{0}' (expected a combination of w/a/s/d)")]
    InvalidDirection(String),

    #[error("routine '{routine}': {message}")]
    Routine { routine: String, message: String },

    #[error("unknown routine '{0}'")]
    UnknownRoutine(String),

    #[error("a routine is already running")]
    AlreadyRunning,

    #[error("configuration error in {path:?}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("device '{0}' is not connected")]
    DeviceNotConnected(String),

    #[error(transparent)]
    Adb(#[from] crate::adb::AdbError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Task failed to complete: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl AutomationError {
    /// True for the cancellation signal, which every script-running context
    /// treats as a clean finish.
    pub fn is_stop(&self) -> bool {
        matches!(self, AutomationError::Stopped)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AutomationError::Timeout { .. })
    }

    pub fn routine(routine: &str, message: impl Into<String>) -> Self {
        AutomationError::Routine {
            routine: routine.to_string(),
            message: message.into(),
        }
    }
}

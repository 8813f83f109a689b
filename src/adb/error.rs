use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for ADB operations.
pub type AdbResult<T> = Result<T, AdbError>;

/// The error type for bridge subprocess calls.
///
/// These never cross the [`Transport`](super::Transport) boundary: callers
/// poll in tight loops, so each failure is logged and turned into
/// `false`/`None` by the transport itself.
#[derive(Debug, Error)]
pub enum AdbError {
    #[error("'{program}' binary not found. Install Android Platform Tools or set ADB_PATH.")]
    NotInstalled { program: String },

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' timed out after {duration:?}")]
    Timeout { command: String, duration: Duration },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("'{command}' produced no output")]
    EmptyOutput { command: String },

    #[error("Could not parse {what} from: {output}")]
    ParseFailed { what: &'static str, output: String },
}

impl AdbError {
    /// Whether retrying the same call later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, AdbError::NotInstalled { .. })
    }
}

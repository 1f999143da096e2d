use std::path::PathBuf;

use thiserror::Error;

use crate::recording::SessionStatus;

pub type RecordResult<T> = Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("{operation} is not allowed while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionStatus,
    },
    #[error("recording clock misuse: {0}")]
    ClockMisuse(&'static str),
    #[error("output already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("encoder exited with {status}: {detail}")]
    EncoderExit { status: String, detail: String },
    #[error("capture error: {0}")]
    Capture(String),
    #[error("session thread panicked")]
    WorkerPanicked,
}

impl RecorderError {
    pub fn invalid_state(operation: &'static str, state: SessionStatus) -> Self {
        Self::InvalidState { operation, state }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for failures of the sink or the output path, which force the
    /// session back to Idle.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists { .. } | Self::Io { .. } | Self::EncoderExit { .. }
        )
    }
}

use std::process::ExitStatus;
use thiserror::Error;

pub type Result<T, E = TranscodeError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start encoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("encoder pipe I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoder exited with {status}: {stderr}")]
    Exited { status: ExitStatus, stderr: String },
    #[error("encoder task failed: {0}")]
    Task(String),
    #[error("upstream audio failed: {0}")]
    Upstream(String),
}

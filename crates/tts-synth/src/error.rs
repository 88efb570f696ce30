use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = SynthesisError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("no response from provider within {0:?}")]
    Timeout(Duration),
    #[error("invalid synthesis configuration: {0}")]
    Config(String),
    #[error("operation not supported by this backend: {0}")]
    Unsupported(String),
}

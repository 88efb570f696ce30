use thiserror::Error;

pub type Result<T, E = CacheError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("object store rejected write: {0}")]
    Store(String),
    #[error("encoding cached audio failed: {0}")]
    Encode(#[from] audio_transcode::TranscodeError),
}

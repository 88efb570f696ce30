use thiserror::Error;

pub type Result<T, E = SegmentError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub(crate) fn compile(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern).map_err(|source| SegmentError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

use audio_transcode::TranscodeError;
use thiserror::Error;
use tts_segmenter::SegmentError;
use tts_synth::SynthesisError;

/// Terminal error of a run; the output stream ends right after yielding it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("token source failed: {0}")]
    TokenSource(String),
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("transcoding failed: {0}")]
    Transcode(#[from] TranscodeError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<SegmentError> for PipelineError {
    fn from(e: SegmentError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

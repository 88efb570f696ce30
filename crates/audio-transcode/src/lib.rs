//! audio-transcode: bridge raw PCM to a compressed streaming format
//!
//! The encoder is an external process (ffmpeg by default). A feeder task
//! writes upstream PCM into its stdin while the returned stream drains its
//! stdout, so neither side waits on the other once the OS pipes fill up.

mod error;
pub use error::{Result, TranscodeError};

mod types;
pub use types::{EncoderCommand, PcmFormat, TranscoderConfig};

mod transcoder;
pub use transcoder::Transcoder;

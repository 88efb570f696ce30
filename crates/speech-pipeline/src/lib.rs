//! speech-pipeline: turn a live token stream into a live audio byte stream
//!
//! Tokens are grouped into sentence-sized segments, each segment is
//! synthesized in order, and the audio is forwarded (optionally through a
//! live encoder) as soon as it arrives. A finished run can be persisted to
//! the audio cache without holding up the caller.

mod error;
pub use error::{PipelineError, Result};

mod config;
pub use config::{load_config_file, OutputConfig, OutputMode, PipelineConfig};

mod metrics;
pub use metrics::PipelineMetrics;

mod state;
pub use state::{PipelineRunState, RunHandle};

mod observer;
pub use observer::{ChannelObserver, TranscriptObserver};

mod pipeline;
pub use pipeline::{text_tokens, SpeechPipeline, SpeechRequest, SpeechRun};

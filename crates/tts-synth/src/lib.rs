//! tts-synth: speech synthesis providers and the per-segment dispatcher
//!
//! Providers turn one piece of text into a stream of audio bytes. The
//! [`Dispatcher`] sits in front of a provider: it strips pacing directives,
//! bounds every wait with a timeout and applies the run's [`FailurePolicy`].

mod error;
pub use error::{Result, SynthesisError};

mod types;
pub use types::{AudioEncoding, BackendKind, FailurePolicy, SynthesisConfig, VoiceSettings};

mod traits;
pub use traits::{AudioByteStream, SynthesisProvider};

mod dispatcher;
pub use dispatcher::{Dispatcher, SegmentEvent};

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::MockSynthesis;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::HttpSynthesis;

pub mod plugin;

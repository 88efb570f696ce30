#[cfg(feature = "http")]
use crate::HttpSynthesis;
#[cfg(feature = "mock")]
use crate::MockSynthesis;
use crate::{AudioEncoding, BackendKind, Result, SynthesisConfig, SynthesisError, SynthesisProvider};
use std::sync::Arc;

pub fn new_synthesis_backend(config: &SynthesisConfig) -> Result<Arc<dyn SynthesisProvider>> {
    match config.backend {
        BackendKind::Mock => {
            #[cfg(feature = "mock")]
            {
                // The tone generator only speaks PCM; honour the configured rate.
                let rate = match config.encoding()? {
                    AudioEncoding::Pcm16 { sample_rate_hz, .. } => sample_rate_hz,
                    other => {
                        return Err(SynthesisError::Unsupported(format!(
                            "mock backend cannot produce {}",
                            other.mime_type()
                        )))
                    }
                };
                Ok(Arc::new(MockSynthesis::new(rate)))
            }
            #[cfg(not(feature = "mock"))]
            {
                Err(SynthesisError::Unsupported("mock feature not enabled".into()))
            }
        }
        BackendKind::Http => {
            #[cfg(feature = "http")]
            {
                Ok(Arc::new(HttpSynthesis::new(config)?))
            }
            #[cfg(not(feature = "http"))]
            {
                Err(SynthesisError::Unsupported("http feature not enabled".into()))
            }
        }
    }
}

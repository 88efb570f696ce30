use crate::{AudioByteStream, AudioEncoding, Result, SynthesisError, SynthesisProvider, VoiceSettings};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Offline provider producing a 440 Hz tone as mono S16LE.
///
/// Clones share the call log, so a test can keep a handle while the pipeline
/// owns the provider.
#[derive(Clone)]
pub struct MockSynthesis {
    sample_rate_hz: u32,
    chunk_bytes: usize,
    fail_on: Vec<String>,
    latency: Option<Duration>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockSynthesis {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz: sample_rate_hz.max(8000),
            chunk_bytes: 4096,
            fail_on: Vec::new(),
            latency: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer with HTTP 503 for any text containing `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    /// Sleep before every chunk.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(2);
        self
    }

    /// Texts received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// The exact bytes `synthesize` streams for `text`.
    pub fn render(&self, text: &str) -> Vec<u8> {
        let sr = self.sample_rate_hz;
        let dur_s = (text.len() as f32 / 10.0).clamp(0.2, 1.0);
        let frames = (sr as f32 * dur_s) as usize;
        let mut out = Vec::with_capacity(frames * 2);
        let freq = 440.0_f32;
        for n in 0..frames {
            let t = n as f32 / sr as f32;
            let s = (2.0 * std::f32::consts::PI * freq * t).sin();
            let v = (s * 3000.0) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }
}

#[async_trait]
impl SynthesisProvider for MockSynthesis {
    fn name(&self) -> &str {
        "mock"
    }

    fn encoding(&self) -> AudioEncoding {
        AudioEncoding::Pcm16 {
            sample_rate_hz: self.sample_rate_hz,
            channels: 1,
        }
    }

    async fn synthesize(&self, text: &str, _voice: &VoiceSettings) -> Result<AudioByteStream> {
        self.calls.lock().push(text.to_string());

        if self.fail_on.iter().any(|needle| text.contains(needle.as_str())) {
            return Err(SynthesisError::Status {
                status: 503,
                body: "mock failure".to_string(),
            });
        }

        let pcm = Bytes::from(self.render(text));
        let chunks: Vec<Bytes> = (0..pcm.len())
            .step_by(self.chunk_bytes)
            .map(|start| pcm.slice(start..(start + self.chunk_bytes).min(pcm.len())))
            .collect();

        match self.latency {
            None => Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Some(latency) => Ok(async_stream::stream! {
                for chunk in chunks {
                    tokio::time::sleep(latency).await;
                    yield Ok(chunk);
                }
            }
            .boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn streams_rendered_tone_in_chunks() {
        let tts = MockSynthesis::new(16_000).with_chunk_bytes(1000);
        let expected = tts.render("hello there");
        let chunks: Vec<Bytes> = tts
            .synthesize("hello there", &VoiceSettings::default())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 1000));
        assert_eq!(chunks.concat(), expected);
        // 11 chars -> 1.1 s clamped to 1.0 s of 16-bit mono
        assert_eq!(expected.len(), 16_000 * 2);
        assert_eq!(tts.calls(), vec!["hello there".to_string()]);
    }

    #[tokio::test]
    async fn injected_failure_is_a_status_error() {
        let tts = MockSynthesis::new(16_000).failing_on("boom");
        let res = tts.synthesize("say boom", &VoiceSettings::default()).await;
        assert!(matches!(res, Err(SynthesisError::Status { status: 503, .. })));
    }
}

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

#[derive(Clone)]
pub struct PipelineMetrics {
    pub registry: Registry,
    pub segments_dispatched: IntCounter,
    pub segments_failed: IntCounter,
    pub bytes_streamed: IntCounter,
    pub runs_completed: IntCounter,
    pub runs_failed: IntCounter,
    pub cache_writes: IntCounter,
    pub cache_failures: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl PipelineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            segments_dispatched: counter(
                &registry,
                "speech_segments_dispatched",
                "Segments handed to the synthesis dispatcher",
            )?,
            segments_failed: counter(
                &registry,
                "speech_segments_failed",
                "Segments whose synthesis failed or timed out",
            )?,
            bytes_streamed: counter(
                &registry,
                "speech_bytes_streamed",
                "Audio bytes delivered to callers",
            )?,
            runs_completed: counter(
                &registry,
                "speech_runs_completed",
                "Runs that streamed to completion",
            )?,
            runs_failed: counter(&registry, "speech_runs_failed", "Runs ended by a fatal error")?,
            cache_writes: counter(&registry, "speech_cache_writes", "Runs persisted to the cache")?,
            cache_failures: counter(
                &registry,
                "speech_cache_failures",
                "Cache writes that failed",
            )?,
            registry,
        })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

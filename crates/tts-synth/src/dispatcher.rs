use crate::{FailurePolicy, Result, SynthesisError, SynthesisProvider, VoiceSettings};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tts_segmenter::{DirectiveStripper, Segment};

/// One item of a dispatched segment's audio.
#[derive(Debug)]
pub enum SegmentEvent {
    Audio(Bytes),
    /// The segment's call failed under [`FailurePolicy::Skip`]; no more audio
    /// follows for this segment.
    Skipped(SynthesisError),
}

/// Sends segments to a provider one at a time.
///
/// Ordering comes from the caller: it drains the stream for segment N before
/// asking for segment N+1.
#[derive(Clone)]
pub struct Dispatcher {
    provider: Arc<dyn SynthesisProvider>,
    stripper: DirectiveStripper,
    voice: VoiceSettings,
    timeout: Duration,
    policy: FailurePolicy,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn SynthesisProvider>,
        stripper: DirectiveStripper,
        voice: VoiceSettings,
        timeout: Duration,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            provider,
            stripper,
            voice,
            timeout,
            policy,
        }
    }

    pub fn provider(&self) -> &Arc<dyn SynthesisProvider> {
        &self.provider
    }

    pub fn voice(&self) -> &VoiceSettings {
        &self.voice
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Same dispatcher with a different voice.
    pub fn with_voice(&self, voice: VoiceSettings) -> Self {
        Self {
            voice,
            ..self.clone()
        }
    }

    /// Stream the audio for one segment.
    ///
    /// Directive-only segments produce nothing and make no provider call.
    /// Every wait on the provider is bounded by the timeout; a timeout is
    /// handled like a failed response. Under [`FailurePolicy::Abort`] a failure
    /// is yielded as the final `Err`.
    pub fn dispatch(
        &self,
        segment: &Segment,
    ) -> impl Stream<Item = Result<SegmentEvent>> + Send + 'static {
        let text = self.stripper.strip(&segment.text);
        let index = segment.index;
        let provider = Arc::clone(&self.provider);
        let voice = self.voice.clone();
        let timeout = self.timeout;
        let policy = self.policy;

        async_stream::stream! {
            if text.is_empty() {
                debug!(segment = index, "directive-only segment, nothing to synthesize");
                return;
            }
            debug!(segment = index, chars = text.len(), "dispatching segment");

            let mut audio = match tokio::time::timeout(timeout, provider.synthesize(&text, &voice)).await {
                Ok(Ok(audio)) => audio,
                Ok(Err(e)) => {
                    yield fail(policy, index, e);
                    return;
                }
                Err(_) => {
                    yield fail(policy, index, SynthesisError::Timeout(timeout));
                    return;
                }
            };

            let mut bytes = 0usize;
            loop {
                match tokio::time::timeout(timeout, audio.next()).await {
                    Ok(Some(Ok(chunk))) => {
                        bytes += chunk.len();
                        yield Ok(SegmentEvent::Audio(chunk));
                    }
                    Ok(Some(Err(e))) => {
                        yield fail(policy, index, e);
                        return;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        yield fail(policy, index, SynthesisError::Timeout(timeout));
                        return;
                    }
                }
            }
            debug!(segment = index, bytes, "segment audio complete");
        }
    }
}

fn fail(policy: FailurePolicy, index: usize, err: SynthesisError) -> Result<SegmentEvent> {
    match policy {
        FailurePolicy::Skip => {
            warn!(segment = index, "synthesis failed, skipping segment: {}", err);
            Ok(SegmentEvent::Skipped(err))
        }
        FailurePolicy::Abort => Err(err),
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::MockSynthesis;
    use tts_segmenter::DEFAULT_DIRECTIVE_PATTERN;

    fn dispatcher(mock: &MockSynthesis, policy: FailurePolicy, timeout: Duration) -> Dispatcher {
        Dispatcher::new(
            Arc::new(mock.clone()),
            DirectiveStripper::new(DEFAULT_DIRECTIVE_PATTERN).unwrap(),
            VoiceSettings::default(),
            timeout,
            policy,
        )
    }

    fn seg(index: usize, text: &str) -> Segment {
        Segment {
            index,
            text: text.to_string(),
        }
    }

    async fn collect(d: &Dispatcher, s: &Segment) -> Vec<Result<SegmentEvent>> {
        d.dispatch(s).collect().await
    }

    #[tokio::test]
    async fn strips_directives_before_synthesis() {
        let mock = MockSynthesis::new(16_000);
        let d = dispatcher(&mock, FailurePolicy::Skip, Duration::from_secs(5));
        let events = collect(&d, &seg(0, "Breathe in. [PAUSE 3s] Hold.")).await;

        let audio: Vec<u8> = events
            .into_iter()
            .map(|e| match e {
                Ok(SegmentEvent::Audio(b)) => b.to_vec(),
                other => panic!("unexpected {other:?}"),
            })
            .flatten()
            .collect();
        assert_eq!(mock.calls(), vec!["Breathe in. Hold.".to_string()]);
        assert_eq!(audio, mock.render("Breathe in. Hold."));
    }

    #[tokio::test]
    async fn directive_only_segment_makes_no_call() {
        let mock = MockSynthesis::new(16_000);
        let d = dispatcher(&mock, FailurePolicy::Skip, Duration::from_secs(5));
        assert!(collect(&d, &seg(0, "[PAUSE 5s]")).await.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn skip_policy_reports_and_ends_segment() {
        let mock = MockSynthesis::new(16_000).failing_on("storm");
        let d = dispatcher(&mock, FailurePolicy::Skip, Duration::from_secs(5));
        let events = collect(&d, &seg(3, "A storm passes.")).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Ok(SegmentEvent::Skipped(SynthesisError::Status { status: 503, .. }))
        ));
    }

    #[tokio::test]
    async fn abort_policy_yields_error() {
        let mock = MockSynthesis::new(16_000).failing_on("storm");
        let d = dispatcher(&mock, FailurePolicy::Abort, Duration::from_secs(5));
        let events = collect(&d, &seg(0, "A storm passes.")).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(SynthesisError::Status { .. })));
    }

    #[tokio::test]
    async fn slow_provider_times_out_like_a_failure() {
        let mock = MockSynthesis::new(16_000).with_latency(Duration::from_millis(300));
        let d = dispatcher(&mock, FailurePolicy::Abort, Duration::from_millis(20));
        let events = collect(&d, &seg(0, "Slowly now.")).await;
        assert!(matches!(events.last(), Some(Err(SynthesisError::Timeout(_)))));
    }
}

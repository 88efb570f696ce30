use crate::config::check_output_mode;
use crate::observer::ObserverRelay;
use crate::{
    OutputMode, PipelineConfig, PipelineError, PipelineMetrics, Result, RunHandle,
    TranscriptObserver,
};
use audio_cache::{CacheAudio, CacheRecord, CacheSink, KeySource, LocalDirStore};
use audio_transcode::{PcmFormat, Transcoder, TranscoderConfig};
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tts_segmenter::{DirectiveStripper, Segment, SegmentBuffer, Segmenter};
use tts_synth::plugin::new_synthesis_backend;
use tts_synth::{AudioEncoding, Dispatcher, SegmentEvent, SynthesisProvider, VoiceSettings};

/// Per-run options.
#[derive(Clone, Default)]
pub struct SpeechRequest {
    /// Overrides the configured voice.
    pub voice: Option<VoiceSettings>,
    /// Caller prompt, used as the cache key text under [`KeySource::Prompt`].
    pub prompt: Option<String>,
    pub observer: Option<Arc<dyn TranscriptObserver>>,
}

impl SpeechRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice(mut self, voice: VoiceSettings) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_observer(mut self, observer: impl TranscriptObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }
}

/// A started run: its audio stream and a handle on its progress.
pub struct SpeechRun {
    pub handle: RunHandle,
    pub audio: BoxStream<'static, Result<Bytes>>,
}

/// Token stream in, audio byte stream out.
///
/// Segments are synthesized one after another; audio for segment N is fully
/// forwarded before segment N+1 is dispatched. Nothing runs until the audio
/// stream is polled.
#[derive(Clone)]
pub struct SpeechPipeline {
    segmenter: Segmenter,
    dispatcher: Dispatcher,
    encoder: Option<Transcoder>,
    /// Set when the delivered audio is raw PCM.
    pcm: Option<PcmFormat>,
    cache_extension: String,
    cache: Option<CacheSink>,
    key_source: KeySource,
    metrics: Option<PipelineMetrics>,
}

impl SpeechPipeline {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let provider = new_synthesis_backend(&config.synthesis)?;
        Self::with_provider(config, provider)
    }

    /// Build around an already constructed provider.
    pub fn with_provider(
        config: &PipelineConfig,
        provider: Arc<dyn SynthesisProvider>,
    ) -> Result<Self> {
        let encoding = provider.encoding();
        check_output_mode(config.output.mode, encoding, &config.transcoder)?;

        let segmenter = Segmenter::new(&config.segmenter)?;
        let dispatcher = Dispatcher::new(
            provider,
            segmenter.directives().clone(),
            config.synthesis.voice.clone(),
            config.synthesis.timeout(),
            config.synthesis.failure_policy,
        );

        let (encoder, pcm, cache_extension) = match (config.output.mode, encoding) {
            (OutputMode::Transcode, _) => (
                Some(Transcoder::new(&config.transcoder)),
                None,
                config.transcoder.container.clone(),
            ),
            (
                _,
                AudioEncoding::Pcm16 {
                    sample_rate_hz,
                    channels,
                },
            ) => (
                None,
                Some(PcmFormat {
                    sample_rate_hz,
                    channels,
                }),
                config.transcoder.container.clone(),
            ),
            (_, other) => (None, None, other.extension().to_string()),
        };

        let cache = config.cache.enabled.then(|| {
            let store = Arc::new(LocalDirStore::new(
                config.cache.root_dir.clone(),
                config.cache.public_base_url.clone(),
            ));
            let sink = CacheSink::new(store, config.cache.prefix.clone());
            match pcm {
                // cached audio is always compressed
                Some(format) => {
                    let batch = TranscoderConfig {
                        sample_rate_hz: format.sample_rate_hz,
                        channels: format.channels,
                        ..config.transcoder.clone()
                    };
                    sink.with_encoder(Transcoder::new(&batch), config.transcoder.container.clone())
                }
                None => sink,
            }
        });

        Ok(Self {
            segmenter,
            dispatcher,
            encoder,
            pcm,
            cache_extension,
            cache,
            key_source: config.cache.key_source,
            metrics: None,
        })
    }

    /// Replace the live encoder; its output is cached as `extension`.
    pub fn with_encoder(mut self, encoder: Transcoder, extension: impl Into<String>) -> Self {
        self.encoder = Some(encoder);
        self.pcm = None;
        self.cache_extension = extension.into();
        self
    }

    pub fn with_cache(mut self, sink: CacheSink, key_source: KeySource) -> Self {
        self.cache = Some(sink);
        self.key_source = key_source;
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Public URL of a cached rendition of `text`, checked before generating anything.
    pub async fn cached_url(&self, text: &str, voice_id: &str) -> Option<String> {
        let sink = self.cache.as_ref()?;
        let extension = match self.pcm {
            Some(_) => sink.pcm_extension(),
            None => self.cache_extension.as_str(),
        };
        sink.lookup(text, voice_id, extension).await
    }

    /// Start a run over `tokens`.
    ///
    /// A token source error ends the stream with [`PipelineError::TokenSource`]
    /// and the buffered remainder is discarded. On clean completion the
    /// remainder is flushed, and once the last chunk has been taken the audio
    /// is handed to the cache in the background.
    pub fn stream<S, E>(&self, tokens: S, request: SpeechRequest) -> SpeechRun
    where
        S: Stream<Item = std::result::Result<String, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let handle = RunHandle::new();
        let dispatcher = match request.voice {
            Some(voice) => self.dispatcher.with_voice(voice),
            None => self.dispatcher.clone(),
        };
        let voice_id = dispatcher.voice().voice_id.clone();
        info!(
            run = %handle.snapshot().run_id,
            voice = %voice_id,
            provider = dispatcher.provider().name(),
            "speech run started"
        );

        let segments = segment_tokens(
            tokens,
            self.segmenter.clone(),
            request.observer,
            handle.clone(),
        );
        let raw = synthesize(
            segments,
            dispatcher,
            self.segmenter.directives().clone(),
            handle.clone(),
            self.metrics.clone(),
        );
        let audio: BoxStream<'static, Result<Bytes>> = match &self.encoder {
            Some(encoder) => encoder.transcode(raw).boxed(),
            None => raw.boxed(),
        };
        let delivery = Delivery {
            cache: self.cache.clone(),
            key_source: self.key_source,
            prompt: request.prompt,
            voice_id,
            pcm: self.pcm,
            extension: self.cache_extension.clone(),
            metrics: self.metrics.clone(),
        };
        SpeechRun {
            audio: delivery.run(audio, handle.clone()).boxed(),
            handle,
        }
    }

    /// Run over `text` split at spaces and collect the whole output.
    pub async fn speak_text(&self, text: &str, request: SpeechRequest) -> Result<(Bytes, RunHandle)> {
        let SpeechRun { handle, mut audio } = self.stream(text_tokens(text), request);
        let mut out = BytesMut::new();
        while let Some(chunk) = audio.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok((out.freeze(), handle))
    }
}

/// Word-sized tokens of `text`, each keeping its trailing space.
pub fn text_tokens(
    text: &str,
) -> impl Stream<Item = std::result::Result<String, Infallible>> + Send + 'static {
    let tokens: Vec<_> = text
        .split_inclusive(' ')
        .map(|t| Ok(t.to_string()))
        .collect();
    futures::stream::iter(tokens)
}

fn segment_tokens<S, E>(
    tokens: S,
    segmenter: Segmenter,
    observer: Option<Arc<dyn TranscriptObserver>>,
    handle: RunHandle,
) -> impl Stream<Item = Result<Segment>> + Send + 'static
where
    S: Stream<Item = std::result::Result<String, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let relay = observer.map(ObserverRelay::spawn);
        let mut buffer = SegmentBuffer::new(segmenter);
        let mut tokens = Box::pin(tokens);
        while let Some(next) = tokens.next().await {
            let token = match next {
                Ok(token) => token,
                Err(e) => {
                    let message = e.to_string();
                    error!(pending = buffer.pending().len(), "token source failed: {}", message);
                    yield Err(PipelineError::TokenSource(message));
                    return;
                }
            };
            handle.update(|s| s.transcript.push_str(&token));
            if let Some(relay) = &relay {
                relay.token(&token);
            }
            if let Some(segment) = buffer.push(&token) {
                yield Ok(segment);
            }
        }

        if let Some(relay) = &relay {
            relay.complete(handle.update(|s| s.transcript.clone()));
        }
        if let Some(segment) = buffer.finish() {
            yield Ok(segment);
        }
    }
}

fn synthesize<S>(
    segments: S,
    dispatcher: Dispatcher,
    directives: DirectiveStripper,
    handle: RunHandle,
    metrics: Option<PipelineMetrics>,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static
where
    S: Stream<Item = Result<Segment>> + Send + 'static,
{
    async_stream::stream! {
        let mut segments = Box::pin(segments);
        while let Some(next) = segments.next().await {
            let segment = match next {
                Ok(segment) => segment,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let pauses: f32 = directives
                .parse(&segment.text)
                .iter()
                .filter_map(|d| d.seconds)
                .sum();
            handle.update(|s| {
                s.segments_dispatched += 1;
                s.pause_seconds += pauses;
            });
            if let Some(m) = &metrics {
                m.segments_dispatched.inc();
            }
            debug!(segment = segment.index, pause_seconds = pauses, "segment ready");

            let mut events = Box::pin(dispatcher.dispatch(&segment));
            while let Some(event) = events.next().await {
                match event {
                    Ok(SegmentEvent::Audio(chunk)) => {
                        yield Ok(chunk);
                    }
                    Ok(SegmentEvent::Skipped(_)) => {
                        handle.update(|s| s.segments_failed += 1);
                        if let Some(m) = &metrics {
                            m.segments_failed.inc();
                        }
                    }
                    Err(e) => {
                        handle.update(|s| s.segments_failed += 1);
                        if let Some(m) = &metrics {
                            m.segments_failed.inc();
                        }
                        yield Err(PipelineError::from(e));
                        return;
                    }
                }
            }
        }
    }
}

/// Final stage: accounting, and the cache handoff after the last chunk.
struct Delivery {
    cache: Option<CacheSink>,
    key_source: KeySource,
    prompt: Option<String>,
    voice_id: String,
    pcm: Option<PcmFormat>,
    extension: String,
    metrics: Option<PipelineMetrics>,
}

impl Delivery {
    fn run(
        self,
        mut audio: BoxStream<'static, Result<Bytes>>,
        handle: RunHandle,
    ) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        async_stream::stream! {
            let mut collected = self.cache.as_ref().map(|_| BytesMut::new());
            while let Some(item) = audio.next().await {
                match item {
                    Ok(chunk) => {
                        let n = chunk.len() as u64;
                        handle.update(|s| s.bytes_streamed += n);
                        if let Some(m) = &self.metrics {
                            m.bytes_streamed.inc_by(n);
                        }
                        if let Some(buf) = collected.as_mut() {
                            buf.extend_from_slice(&chunk);
                        }
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        let message = e.to_string();
                        error!("speech run failed: {}", message);
                        handle.update(|s| s.error = Some(message));
                        if let Some(m) = &self.metrics {
                            m.runs_failed.inc();
                        }
                        yield Err(e);
                        return;
                    }
                }
            }

            let summary = handle.update(|s| {
                s.completed = true;
                s.clone()
            });
            if let Some(m) = &self.metrics {
                m.runs_completed.inc();
            }
            info!(
                run = %summary.run_id,
                segments = summary.segments_dispatched,
                failed = summary.segments_failed,
                bytes = summary.bytes_streamed,
                pause_seconds = summary.pause_seconds,
                "speech run complete"
            );

            if let Some(buf) = collected {
                self.hand_off(buf.freeze(), summary.transcript, summary.segments_failed, &handle);
            }
        }
    }

    fn hand_off(self, bytes: Bytes, transcript: String, failed: usize, handle: &RunHandle) {
        let Some(sink) = self.cache else {
            return;
        };
        if failed > 0 {
            info!(failed, "run skipped segments, not caching");
            return;
        }
        if bytes.is_empty() {
            debug!("run produced no audio, nothing to cache");
            return;
        }
        let text = match self.key_source {
            KeySource::Prompt => self.prompt.unwrap_or(transcript),
            KeySource::Transcript => transcript,
        };
        let audio = match self.pcm {
            Some(format) => CacheAudio::Pcm { bytes, format },
            None => CacheAudio::Encoded {
                bytes,
                extension: self.extension,
            },
        };
        handle.set_cache_task(spawn_cache_write(
            sink,
            text,
            self.voice_id,
            audio,
            handle.clone(),
            self.metrics,
        ));
    }
}

fn spawn_cache_write(
    sink: CacheSink,
    text: String,
    voice_id: String,
    audio: CacheAudio,
    handle: RunHandle,
    metrics: Option<PipelineMetrics>,
) -> JoinHandle<Option<CacheRecord>> {
    tokio::spawn(async move {
        let record = sink.persist(&text, &voice_id, audio).await;
        match &record {
            Some(r) => {
                handle.update(|s| s.cache_url = Some(r.url.clone()));
                if let Some(m) = &metrics {
                    m.cache_writes.inc();
                }
            }
            None => {
                if let Some(m) = &metrics {
                    m.cache_failures.inc();
                }
            }
        }
        record
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tts_synth::MockSynthesis;

    fn pipeline(mock: &MockSynthesis) -> SpeechPipeline {
        let mut cfg = PipelineConfig::default();
        cfg.output.mode = OutputMode::RawPcm;
        SpeechPipeline::with_provider(&cfg, Arc::new(mock.clone())).unwrap()
    }

    #[tokio::test]
    async fn text_tokens_keep_spacing() {
        let tokens: Vec<String> = text_tokens("Take a deep breath.")
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["Take ", "a ", "deep ", "breath."]);
    }

    #[tokio::test]
    async fn observer_panic_does_not_stop_the_run() {
        let mock = MockSynthesis::new(16_000);
        let request = SpeechRequest::new().with_observer(|token: &str| {
            if token.starts_with("Now") {
                panic!("observer bug");
            }
        });
        let (audio, handle) = pipeline(&mock)
            .speak_text("Take a deep breath. Now exhale.", request)
            .await
            .unwrap();
        assert!(!audio.is_empty());
        assert_eq!(handle.snapshot().segments_dispatched, 2);
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn pause_seconds_are_totalled() {
        let mock = MockSynthesis::new(16_000);
        let (_, handle) = pipeline(&mock)
            .speak_text("Settle in. [PAUSE 2s] Let go. [PAUSE 1.5s]", SpeechRequest::new())
            .await
            .unwrap();
        let snap = handle.snapshot();
        assert!((snap.pause_seconds - 3.5).abs() < 1e-6);
        assert!(snap.completed);
    }

    #[tokio::test]
    async fn stream_is_lazy() {
        let mock = MockSynthesis::new(16_000);
        let run = pipeline(&mock).stream(
            stream::iter(vec![Ok::<_, Infallible>("Hello there. ".to_string())]),
            SpeechRequest::new(),
        );
        assert!(mock.calls().is_empty());
        drop(run);
        assert!(mock.calls().is_empty());
    }
}

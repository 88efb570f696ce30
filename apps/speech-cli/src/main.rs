use anyhow::{Context, Result};
use audio_cache::CacheKey;
use audio_transcode::{PcmFormat, Transcoder, TranscoderConfig};
use bytes::Bytes;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use speech_pipeline::{
    load_config_file, text_tokens, OutputMode, PipelineConfig, PipelineMetrics, SpeechPipeline,
    SpeechRequest, SpeechRun,
};
use std::convert::Infallible;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tts_segmenter::{SegmentBuffer, Segmenter};
use tts_synth::{FailurePolicy, VoiceSettings};

#[derive(Parser, Debug)]
#[command(
    name = "speech",
    version,
    about = "Streaming text-to-speech pipeline tools",
    disable_help_subcommand = true
)]
struct Cli {
    /// Pipeline config (YAML); built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct TextInput {
    /// Text to process
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    /// Read the text from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl TextInput {
    fn read(&self) -> Result<String> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => {
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
            }
            (None, None) => anyhow::bail!("pass --text or --file"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Mode {
    Passthrough,
    Transcode,
    RawPcm,
}

impl From<Mode> for OutputMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Passthrough => OutputMode::Passthrough,
            Mode::Transcode => OutputMode::Transcode,
            Mode::RawPcm => OutputMode::RawPcm,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Policy {
    Skip,
    Abort,
}

impl From<Policy> for FailurePolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Skip => FailurePolicy::Skip,
            Policy::Abort => FailurePolicy::Abort,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show how text is cut into segments when streamed word by word
    Segment {
        #[command(flatten)]
        input: TextInput,
    },
    /// Remove pacing directives and list the pauses they request
    Strip {
        #[command(flatten)]
        input: TextInput,
    },
    /// Run the full pipeline over text and write the audio
    Speak {
        #[command(flatten)]
        input: TextInput,
        /// Output file; raw PCM output is written as WAV
        #[arg(long)]
        out: PathBuf,
        /// Voice id override
        #[arg(long)]
        voice: Option<String>,
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        #[arg(long, value_enum)]
        policy: Option<Policy>,
        /// Feed tokens of this many characters instead of words
        #[arg(long)]
        chunk_chars: Option<usize>,
        /// Prompt used as cache key text when the cache keys on prompts
        #[arg(long)]
        prompt: Option<String>,
        /// Synthesize even when the cache already holds this text
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
        /// Print prometheus metrics after the run
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Batch-encode a 16-bit WAV file with the configured encoder
    Transcode {
        /// Input WAV
        #[arg(long)]
        input: PathBuf,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the cache key and storage path for text and voice
    CacheKey {
        #[command(flatten)]
        input: TextInput,
        #[arg(long, default_value = "default")]
        voice: String,
        #[arg(long, default_value = "mp3")]
        ext: String,
    },
    /// Print the effective configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Segment { input } => segment_cmd(&config, &input.read()?),
        Commands::Strip { input } => strip_cmd(&config, &input.read()?),
        Commands::Speak {
            input,
            out,
            voice,
            mode,
            policy,
            chunk_chars,
            prompt,
            force,
            metrics,
        } => {
            let mut config = config;
            if let Some(mode) = mode {
                config.output.mode = mode.into();
            }
            if let Some(policy) = policy {
                config.synthesis.failure_policy = policy.into();
            }
            let opts = SpeakOptions {
                voice,
                chunk_chars,
                prompt,
                force,
                metrics,
            };
            speak_cmd(config, &input.read()?, &out, opts).await
        }
        Commands::Transcode { input, out } => transcode_cmd(&config.transcoder, &input, &out).await,
        Commands::CacheKey { input, voice, ext } => {
            cache_key_cmd(&config, &input.read()?, &voice, &ext)
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn segment_cmd(config: &PipelineConfig, text: &str) -> Result<()> {
    let segmenter = Segmenter::new(&config.segmenter)?;
    let stripper = segmenter.directives().clone();
    let mut buffer = SegmentBuffer::new(segmenter);
    let mut segments = Vec::new();
    for token in text.split_inclusive(' ') {
        segments.extend(buffer.push(token));
    }
    segments.extend(buffer.finish());
    for seg in segments {
        let spoken = stripper.strip(&seg.text);
        if spoken.is_empty() {
            println!("[{}] (directive only) {:?}", seg.index, seg.text);
        } else {
            println!("[{}] {}", seg.index, spoken);
        }
    }
    Ok(())
}

fn strip_cmd(config: &PipelineConfig, text: &str) -> Result<()> {
    let segmenter = Segmenter::new(&config.segmenter)?;
    let stripper = segmenter.directives();
    println!("{}", stripper.strip(text));
    for d in stripper.parse(text) {
        match d.seconds {
            Some(s) => eprintln!("pause {s}s"),
            None => eprintln!("pause (unspecified)"),
        }
    }
    Ok(())
}

struct SpeakOptions {
    voice: Option<String>,
    chunk_chars: Option<usize>,
    prompt: Option<String>,
    force: bool,
    metrics: bool,
}

async fn speak_cmd(config: PipelineConfig, text: &str, out: &Path, opts: SpeakOptions) -> Result<()> {
    let metrics = PipelineMetrics::new().context("initialising metrics")?;
    let pipeline = SpeechPipeline::from_config(&config)?.with_metrics(metrics.clone());

    let voice = match opts.voice {
        Some(id) => VoiceSettings {
            voice_id: id,
            ..config.synthesis.voice.clone()
        },
        None => config.synthesis.voice.clone(),
    };
    if !opts.force {
        let key_text = opts.prompt.as_deref().unwrap_or(text);
        if let Some(url) = pipeline.cached_url(key_text, &voice.voice_id).await {
            println!("cached: {url}");
            return Ok(());
        }
    }

    let mut request = SpeechRequest::new().with_voice(voice);
    if let Some(prompt) = opts.prompt {
        request = request.with_prompt(prompt);
    }
    let SpeechRun { handle, mut audio } = match opts.chunk_chars {
        Some(n) => pipeline.stream(char_tokens(text, n), request),
        None => pipeline.stream(text_tokens(text), request),
    };

    let raw_pcm = config.output.mode == OutputMode::RawPcm;
    let mut pcm = Vec::new();
    let mut file = if raw_pcm {
        None
    } else {
        let f = File::create(out).with_context(|| format!("creating {}", out.display()))?;
        Some(BufWriter::new(f))
    };
    let mut first = true;
    while let Some(chunk) = audio.next().await {
        let chunk = chunk?;
        if first {
            info!(bytes = chunk.len(), "first audio chunk");
            first = false;
        }
        match file.as_mut() {
            Some(f) => f.write_all(&chunk)?,
            None => pcm.extend_from_slice(&chunk),
        }
    }
    if let Some(mut f) = file {
        f.flush()?;
    } else {
        let format = config.synthesis.encoding()?;
        let rate = match format {
            tts_synth::AudioEncoding::Pcm16 { sample_rate_hz, .. } => sample_rate_hz,
            _ => config.transcoder.sample_rate_hz,
        };
        write_wav(out, &pcm, PcmFormat::mono(rate))?;
    }

    if let Some(record) = handle.wait_for_cache().await {
        println!("cached at {}", record.url);
    }
    let summary = handle.snapshot();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if opts.metrics {
        print!("{}", metrics.encode_text());
    }
    Ok(())
}

/// Fixed-width tokens, for watching segmentation under fine-grained streaming.
fn char_tokens(
    text: &str,
    n: usize,
) -> impl futures::Stream<Item = std::result::Result<String, Infallible>> + Send + 'static {
    let chars: Vec<char> = text.chars().collect();
    let tokens: Vec<_> = chars
        .chunks(n.max(1))
        .map(|c| Ok(c.iter().collect::<String>()))
        .collect();
    futures::stream::iter(tokens)
}

fn write_wav(path: &Path, pcm: &[u8], format: PcmFormat) -> Result<()> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for s in pcm.chunks_exact(2) {
        w.write_sample(i16::from_le_bytes([s[0], s[1]]))?;
    }
    w.finalize()?;
    Ok(())
}

fn read_wav(path: &Path) -> Result<(Bytes, PcmFormat)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        anyhow::bail!(
            "{}: expected 16-bit integer samples, got {} bits {:?}",
            path.display(),
            spec.bits_per_sample,
            spec.sample_format
        );
    }
    let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
    for s in reader.samples::<i16>() {
        pcm.extend_from_slice(&s?.to_le_bytes());
    }
    let format = PcmFormat {
        sample_rate_hz: spec.sample_rate,
        channels: spec.channels,
    };
    Ok((Bytes::from(pcm), format))
}

async fn transcode_cmd(config: &TranscoderConfig, input: &Path, out: &Path) -> Result<()> {
    let (pcm, format) = read_wav(input)?;
    let cfg = TranscoderConfig {
        sample_rate_hz: format.sample_rate_hz,
        channels: format.channels,
        ..config.clone()
    };
    let transcoder = Transcoder::new(&cfg);
    info!(
        seconds = format.duration_secs(pcm.len()),
        codec = %cfg.codec,
        "encoding"
    );
    let encoded = transcoder.transcode_all(pcm).await?;
    if encoded.is_empty() {
        warn!("encoder produced no output");
    }
    fs::write(out, &encoded).with_context(|| format!("writing {}", out.display()))?;
    println!("{} bytes -> {}", encoded.len(), out.display());
    Ok(())
}

fn cache_key_cmd(config: &PipelineConfig, text: &str, voice: &str, ext: &str) -> Result<()> {
    let key = CacheKey::new(text, voice);
    println!("key:  {key}");
    println!("path: {}", key.object_path(&config.cache.prefix, voice, ext));
    Ok(())
}

use crate::{PipelineError, Result};
use anyhow::Context;
use audio_cache::CacheConfig;
use audio_transcode::TranscoderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tts_segmenter::SegmenterConfig;
use tts_synth::{AudioEncoding, SynthesisConfig};

/// What the caller receives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Provider bytes forwarded untouched.
    Passthrough,
    /// Provider PCM fed through the live encoder.
    #[default]
    Transcode,
    /// Provider PCM forwarded untouched.
    RawPcm,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub mode: OutputMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl PipelineConfig {
    /// Check that the configured provider output suits the output mode.
    pub fn validate(&self) -> Result<()> {
        check_output_mode(self.output.mode, self.synthesis.encoding()?, &self.transcoder)
    }
}

pub(crate) fn check_output_mode(
    mode: OutputMode,
    encoding: AudioEncoding,
    transcoder: &TranscoderConfig,
) -> Result<()> {
    match (mode, encoding) {
        (OutputMode::Passthrough, _) => Ok(()),
        (OutputMode::RawPcm, AudioEncoding::Pcm16 { .. }) => Ok(()),
        (
            OutputMode::Transcode,
            AudioEncoding::Pcm16 {
                sample_rate_hz,
                channels,
            },
        ) => {
            let input = transcoder.input_format();
            if input.sample_rate_hz != sample_rate_hz || input.channels != channels {
                return Err(PipelineError::Config(format!(
                    "provider emits {sample_rate_hz} Hz x{channels} but the encoder expects {} Hz x{}",
                    input.sample_rate_hz, input.channels
                )));
            }
            Ok(())
        }
        (mode, other) => Err(PipelineError::Config(format!(
            "output mode {mode:?} needs PCM from the provider, got {}",
            other.mime_type()
        ))),
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<PipelineConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let cfg: PipelineConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing pipeline config: {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating pipeline config: {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tts_synth::FailurePolicy;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: PipelineConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.output.mode, OutputMode::Transcode);
        assert_eq!(cfg.segmenter.min_directive_len, 20);
        assert_eq!(cfg.transcoder.program, "ffmpeg");
        assert!(!cfg.cache.enabled);
        cfg.validate().unwrap();
    }

    #[test]
    fn loads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "synthesis:\n  failure_policy: abort\n  voice:\n    voice_id: calm\noutput:\n  mode: raw_pcm\ncache:\n  enabled: true\n  prefix: guided\n"
        )
        .unwrap();
        let cfg = load_config_file(file.path()).unwrap();
        assert_eq!(cfg.synthesis.failure_policy, FailurePolicy::Abort);
        assert_eq!(cfg.synthesis.voice.voice_id, "calm");
        assert_eq!(cfg.output.mode, OutputMode::RawPcm);
        assert_eq!(cfg.cache.prefix, "guided");
    }

    #[test]
    fn transcode_rejects_compressed_provider_output() {
        let mut cfg = PipelineConfig::default();
        cfg.synthesis.output_format = "mp3_44100_128".to_string();
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
        cfg.output.mode = OutputMode::Passthrough;
        cfg.validate().unwrap();
    }

    #[test]
    fn transcode_rejects_rate_mismatch() {
        let mut cfg = PipelineConfig::default();
        cfg.synthesis.output_format = "pcm_16000".to_string();
        assert!(cfg.validate().is_err());
        cfg.transcoder.sample_rate_hz = 16_000;
        cfg.validate().unwrap();
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config_file("/nonexistent/pipeline.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/pipeline.yaml"));
    }
}

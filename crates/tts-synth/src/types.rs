use crate::{Result, SynthesisError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub voice_id: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity")]
    pub similarity_boost: f32,
    #[serde(default)]
    pub style: f32,
    #[serde(default = "default_speaker_boost")]
    pub speaker_boost: bool,
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity() -> f32 {
    0.75
}

fn default_speaker_boost() -> bool {
    true
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_id: "default".to_string(),
            stability: default_stability(),
            similarity_boost: default_similarity(),
            style: 0.0,
            speaker_boost: default_speaker_boost(),
        }
    }
}

/// What to do when one segment's synthesis call fails or times out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, end that segment's audio and carry on with the next segment.
    #[default]
    Skip,
    /// End the whole run with an error.
    Abort,
}

/// Byte format of provider output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// Signed 16-bit little-endian interleaved samples.
    Pcm16 { sample_rate_hz: u32, channels: u16 },
    Mp3,
    Opus,
}

impl AudioEncoding {
    /// Parse a provider `output_format` such as `pcm_24000`, `mp3_44100_128` or `opus_48000_64`.
    pub fn from_output_format(format: &str) -> Result<Self> {
        let mut parts = format.split('_');
        match parts.next() {
            Some("pcm") => {
                let rate = parts
                    .next()
                    .and_then(|r| r.parse::<u32>().ok())
                    .ok_or_else(|| {
                        SynthesisError::Config(format!("missing sample rate in `{format}`"))
                    })?;
                Ok(Self::Pcm16 {
                    sample_rate_hz: rate,
                    channels: 1,
                })
            }
            Some("mp3") => Ok(Self::Mp3),
            Some("opus") => Ok(Self::Opus),
            _ => Err(SynthesisError::Unsupported(format!(
                "output format `{format}`"
            ))),
        }
    }

    pub fn is_pcm(&self) -> bool {
        matches!(self, Self::Pcm16 { .. })
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pcm16 { .. } => "audio/L16",
            Self::Mp3 => "audio/mpeg",
            Self::Opus => "audio/ogg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pcm16 { .. } => "pcm",
            Self::Mp3 => "mp3",
            Self::Opus => "ogg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Mock,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the provider API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub voice: VoiceSettings,
}

fn default_backend() -> BackendKind {
    BackendKind::Mock
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8880/v1/text-to-speech".to_string()
}

fn default_api_key_env() -> String {
    "TTS_API_KEY".to_string()
}

fn default_api_key_header() -> String {
    "xi-api-key".to_string()
}

fn default_output_format() -> String {
    "pcm_24000".to_string()
}

fn default_timeout_ms() -> u64 {
    15_000
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            api_key_header: default_api_key_header(),
            model_id: None,
            output_format: default_output_format(),
            timeout_ms: default_timeout_ms(),
            failure_policy: FailurePolicy::default(),
            voice: VoiceSettings::default(),
        }
    }
}

impl SynthesisConfig {
    pub fn encoding(&self) -> Result<AudioEncoding> {
        AudioEncoding::from_output_format(&self.output_format)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_output_formats() {
        assert_eq!(
            AudioEncoding::from_output_format("pcm_24000").unwrap(),
            AudioEncoding::Pcm16 {
                sample_rate_hz: 24_000,
                channels: 1
            }
        );
        assert_eq!(
            AudioEncoding::from_output_format("mp3_44100_128").unwrap(),
            AudioEncoding::Mp3
        );
        assert!(AudioEncoding::from_output_format("pcm").is_err());
        assert!(AudioEncoding::from_output_format("flac_44100").is_err());
    }

    #[test]
    fn config_defaults_from_empty_object() {
        let cfg: SynthesisConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.backend, BackendKind::Mock);
        assert_eq!(cfg.failure_policy, FailurePolicy::Skip);
        assert_eq!(cfg.timeout(), std::time::Duration::from_secs(15));
        assert_eq!(cfg.voice.voice_id, "default");
    }

    #[test]
    fn failure_policy_names() {
        let p: FailurePolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(p, FailurePolicy::Abort);
    }
}

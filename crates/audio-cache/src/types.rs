use audio_transcode::PcmFormat;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;

/// Which text a run's cache key is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// The full generated transcript.
    #[default]
    Transcript,
    /// The caller's prompt, so a repeat request can be answered before generation.
    Prompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_root")]
    pub root_dir: PathBuf,
    #[serde(default = "default_base_url")]
    pub public_base_url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub key_source: KeySource,
}

fn default_root() -> PathBuf {
    PathBuf::from("./audio-cache")
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/audio".to_string()
}

fn default_prefix() -> String {
    "tts".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root_dir: default_root(),
            public_base_url: default_base_url(),
            prefix: default_prefix(),
            key_source: KeySource::default(),
        }
    }
}

/// Assembled audio handed to the sink after a run.
#[derive(Debug, Clone)]
pub enum CacheAudio {
    /// Already compressed; stored as-is.
    Encoded { bytes: Bytes, extension: String },
    /// Raw S16LE; compressed with the sink's batch encoder before storing.
    Pcm { bytes: Bytes, format: PcmFormat },
}

impl CacheAudio {
    pub fn len(&self) -> usize {
        match self {
            Self::Encoded { bytes, .. } | Self::Pcm { bytes, .. } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub key: String,
    pub path: String,
    pub url: String,
    pub bytes: usize,
    pub stored_at: OffsetDateTime,
}

pub(crate) fn content_type(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        "adts" | "aac" => "audio/aac",
        "ogg" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        "pcm" => "audio/L16",
        _ => "application/octet-stream",
    }
}

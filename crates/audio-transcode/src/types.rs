use serde::{Deserialize, Serialize};

/// Raw signed 16-bit little-endian PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate_hz: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn mono(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            channels: 1,
        }
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate_hz as usize * self.channels as usize * Self::BYTES_PER_SAMPLE
    }

    pub fn duration_secs(&self, bytes: usize) -> f64 {
        bytes as f64 / self.bytes_per_second() as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    /// Size of each read from the encoder's stdout.
    #[serde(default = "default_read_chunk")]
    pub read_chunk_bytes: usize,
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_sample_rate() -> u32 {
    24_000
}

fn default_channels() -> u16 {
    1
}

fn default_codec() -> String {
    "libmp3lame".to_string()
}

fn default_container() -> String {
    "mp3".to_string()
}

fn default_bitrate() -> String {
    "64k".to_string()
}

fn default_read_chunk() -> usize {
    4096
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            sample_rate_hz: default_sample_rate(),
            channels: default_channels(),
            codec: default_codec(),
            container: default_container(),
            bitrate: default_bitrate(),
            read_chunk_bytes: default_read_chunk(),
        }
    }
}

impl TranscoderConfig {
    pub fn input_format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate_hz: self.sample_rate_hz,
            channels: self.channels,
        }
    }
}

/// Program plus arguments for an encoder reading stdin and writing stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EncoderCommand {
    pub fn new<I, A>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// ffmpeg reading raw S16LE at the configured rate and channel count and
    /// writing the compressed container, flushing every packet.
    pub fn ffmpeg_encode(config: &TranscoderConfig) -> Self {
        let rate = config.sample_rate_hz.to_string();
        let channels = config.channels.to_string();
        Self::new(
            config.program.clone(),
            [
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "s16le",
                "-ar",
                rate.as_str(),
                "-ac",
                channels.as_str(),
                "-i",
                "pipe:0",
                "-vn",
                "-c:a",
                config.codec.as_str(),
                "-b:a",
                config.bitrate.as_str(),
                "-flush_packets",
                "1",
                "-f",
                config.container.as_str(),
                "pipe:1",
            ],
        )
    }

    /// ffmpeg decoding `container` from stdin back to raw S16LE.
    pub fn ffmpeg_decode(program: &str, container: &str, output: PcmFormat) -> Self {
        let rate = output.sample_rate_hz.to_string();
        let channels = output.channels.to_string();
        Self::new(
            program,
            [
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                container,
                "-i",
                "pipe:0",
                "-f",
                "s16le",
                "-ar",
                rate.as_str(),
                "-ac",
                channels.as_str(),
                "pipe:1",
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_command_carries_input_format() {
        let cfg = TranscoderConfig {
            sample_rate_hz: 16_000,
            ..Default::default()
        };
        let cmd = EncoderCommand::ffmpeg_encode(&cfg);
        assert_eq!(cmd.program, "ffmpeg");
        let joined = cmd.args.join(" ");
        assert!(joined.contains("-f s16le -ar 16000 -ac 1 -i pipe:0"));
        assert!(joined.ends_with("-f mp3 pipe:1"));
    }

    #[test]
    fn pcm_duration() {
        let fmt = PcmFormat::mono(24_000);
        assert_eq!(fmt.bytes_per_second(), 48_000);
        assert!((fmt.duration_secs(72_000) - 1.5).abs() < f64::EPSILON);
    }
}

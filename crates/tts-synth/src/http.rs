//! Streaming HTTP client for hosted text-to-speech services.
//!
//! Sends `POST {endpoint}/{voice_id}/stream?output_format=...` with a JSON body
//! and forwards the chunked response body as it arrives.

use crate::{
    AudioByteStream, AudioEncoding, Result, SynthesisConfig, SynthesisError, SynthesisProvider,
    VoiceSettings,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

const ERROR_BODY_LIMIT: usize = 512;

pub struct HttpSynthesis {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_header: String,
    model_id: Option<String>,
    output_format: String,
    encoding: AudioEncoding,
}

impl HttpSynthesis {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let encoding = config.encoding()?;
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            debug!(
                "{} not set; sending synthesis requests without an API key",
                config.api_key_env
            );
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            api_key_header: config.api_key_header.clone(),
            model_id: config.model_id.clone(),
            output_format: config.output_format.clone(),
            encoding,
        })
    }

    fn url(&self, voice: &VoiceSettings) -> String {
        format!("{}/{}/stream", self.endpoint, voice.voice_id)
    }
}

#[async_trait]
impl SynthesisProvider for HttpSynthesis {
    fn name(&self) -> &str {
        "http"
    }

    fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<AudioByteStream> {
        #[derive(serde::Serialize)]
        struct VoiceReq {
            stability: f32,
            similarity_boost: f32,
            style: f32,
            use_speaker_boost: bool,
        }
        #[derive(serde::Serialize)]
        struct SpeechReq<'a> {
            text: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            model_id: Option<&'a str>,
            voice_settings: VoiceReq,
        }

        let req = SpeechReq {
            text,
            model_id: self.model_id.as_deref(),
            voice_settings: VoiceReq {
                stability: voice.stability,
                similarity_boost: voice.similarity_boost,
                style: voice.style,
                use_speaker_boost: voice.speaker_boost,
            },
        };

        let mut request = self
            .client
            .post(self.url(voice))
            .query(&[("output_format", self.output_format.as_str())])
            .json(&req);
        if let Some(key) = &self.api_key {
            request = request.header(self.api_key_header.as_str(), key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(SynthesisError::from))
            .boxed())
    }
}

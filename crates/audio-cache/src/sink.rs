use crate::types::content_type;
use crate::{CacheAudio, CacheKey, CacheRecord, ObjectStore, Result};
use audio_transcode::Transcoder;
use bytes::Bytes;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Batch encoder for runs that delivered raw PCM.
#[derive(Clone)]
struct CacheEncoder {
    transcoder: Transcoder,
    extension: String,
}

/// Persists finished audio; failures are logged and swallowed.
#[derive(Clone)]
pub struct CacheSink {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    encoder: Option<CacheEncoder>,
}

impl CacheSink {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            encoder: None,
        }
    }

    /// Compress PCM payloads with `transcoder`, storing them as `extension`.
    pub fn with_encoder(mut self, transcoder: Transcoder, extension: impl Into<String>) -> Self {
        self.encoder = Some(CacheEncoder {
            transcoder,
            extension: extension.into(),
        });
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Storage path a payload with `extension` would be written to.
    pub fn object_path(&self, text: &str, voice_id: &str, extension: &str) -> String {
        CacheKey::new(text, voice_id).object_path(&self.prefix, voice_id, extension)
    }

    /// Store `audio` under the key for (`text`, `voice_id`).
    ///
    /// Returns `None` on any failure; the error is logged, never propagated.
    pub async fn persist(&self, text: &str, voice_id: &str, audio: CacheAudio) -> Option<CacheRecord> {
        match self.try_persist(text, voice_id, audio).await {
            Ok(record) => {
                info!(url = %record.url, bytes = record.bytes, "cached synthesized audio");
                Some(record)
            }
            Err(e) => {
                warn!("audio cache write failed: {}", e);
                None
            }
        }
    }

    /// Extension PCM payloads are stored under: the encoder's, or `pcm`.
    pub fn pcm_extension(&self) -> &str {
        self.encoder.as_ref().map_or("pcm", |enc| enc.extension.as_str())
    }

    /// Extension `audio` will be stored under by [`CacheSink::persist`].
    pub fn extension_for<'a>(&'a self, audio: &'a CacheAudio) -> &'a str {
        match audio {
            CacheAudio::Encoded { extension, .. } => extension,
            CacheAudio::Pcm { .. } => self.pcm_extension(),
        }
    }

    async fn try_persist(&self, text: &str, voice_id: &str, audio: CacheAudio) -> Result<CacheRecord> {
        let key = CacheKey::new(text, voice_id);
        let extension = self.extension_for(&audio).to_string();
        let bytes: Bytes = match audio {
            CacheAudio::Encoded { bytes, .. } => bytes,
            CacheAudio::Pcm { bytes, format } => match &self.encoder {
                Some(enc) => {
                    debug!(
                        pcm_bytes = bytes.len(),
                        seconds = format.duration_secs(bytes.len()),
                        "encoding PCM for cache"
                    );
                    enc.transcoder.transcode_all(bytes).await?
                }
                None => bytes,
            },
        };

        let path = key.object_path(&self.prefix, voice_id, &extension);
        let size = bytes.len();
        self.store.put(&path, bytes, content_type(&extension)).await?;
        Ok(CacheRecord {
            key: key.as_str().to_string(),
            url: self.store.public_url(&path),
            path,
            bytes: size,
            stored_at: OffsetDateTime::now_utc(),
        })
    }

    /// Public URL of a previously cached rendition, if one exists.
    pub async fn lookup(&self, text: &str, voice_id: &str, extension: &str) -> Option<String> {
        let path = self.object_path(text, voice_id, extension);
        match self.store.exists(&path).await {
            Ok(true) => Some(self.store.public_url(&path)),
            Ok(false) => None,
            Err(e) => {
                warn!("audio cache lookup failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use audio_transcode::{EncoderCommand, PcmFormat};

    #[tokio::test]
    async fn persists_encoded_audio_and_finds_it_again() {
        let store = Arc::new(MemoryStore::new());
        let sink = CacheSink::new(store.clone(), "tts");

        let record = sink
            .persist(
                "Breathe in.",
                "calm",
                CacheAudio::Encoded {
                    bytes: Bytes::from_static(b"ID3fake"),
                    extension: "mp3".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.bytes, 7);
        assert!(record.path.starts_with("tts/calm/"));
        assert_eq!(store.get(&record.path).unwrap(), Bytes::from_static(b"ID3fake"));
        assert_eq!(store.content_type(&record.path).unwrap(), "audio/mpeg");
        assert_eq!(
            sink.lookup("  Breathe   in. ", "calm", "mp3").await,
            Some(record.url.clone())
        );
        assert_eq!(sink.lookup("Breathe in.", "bright", "mp3").await, None);
    }

    #[tokio::test]
    async fn pcm_goes_through_batch_encoder() {
        let store = Arc::new(MemoryStore::new());
        // tr stands in for a real encoder
        let enc = Transcoder::with_command(EncoderCommand::new("tr", ["a-z", "A-Z"]), 1024);
        let sink = CacheSink::new(store.clone(), "tts").with_encoder(enc, "mp3");

        let record = sink
            .persist(
                "Rest.",
                "calm",
                CacheAudio::Pcm {
                    bytes: Bytes::from_static(b"pcm data"),
                    format: PcmFormat::mono(24_000),
                },
            )
            .await
            .unwrap();
        assert!(record.path.ends_with(".mp3"));
        assert_eq!(store.get(&record.path).unwrap(), Bytes::from_static(b"PCM DATA"));
    }

    #[tokio::test]
    async fn raw_pcm_is_found_under_the_extension_it_was_written_with() {
        let store = Arc::new(MemoryStore::new());
        let sink = CacheSink::new(store.clone(), "tts");
        let audio = CacheAudio::Pcm {
            bytes: Bytes::from_static(b"pcm data"),
            format: PcmFormat::mono(24_000),
        };
        assert_eq!(sink.extension_for(&audio), "pcm");

        let record = sink.persist("Rest now.", "calm", audio).await.unwrap();
        assert!(record.path.ends_with(".pcm"));
        assert_eq!(
            sink.lookup("Rest now.", "calm", sink.pcm_extension()).await,
            Some(record.url)
        );
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let sink = CacheSink::new(Arc::new(MemoryStore::failing()), "tts");
        let res = sink
            .persist(
                "Rest.",
                "calm",
                CacheAudio::Encoded {
                    bytes: Bytes::from_static(b"x"),
                    extension: "mp3".to_string(),
                },
            )
            .await;
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn encoder_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        let enc = Transcoder::with_command(EncoderCommand::new("sh", ["-c", "exit 2"]), 1024);
        let sink = CacheSink::new(store.clone(), "tts").with_encoder(enc, "mp3");
        let res = sink
            .persist(
                "Rest.",
                "calm",
                CacheAudio::Pcm {
                    bytes: Bytes::from_static(b"pcm"),
                    format: PcmFormat::mono(24_000),
                },
            )
            .await;
        assert!(res.is_none());
        assert!(store.is_empty());
    }
}

use crate::{AudioEncoding, Result, VoiceSettings};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Audio bytes for one synthesis call, in sample order.
pub type AudioByteStream = BoxStream<'static, Result<Bytes>>;

/// An external text-to-speech backend.
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Format of the bytes produced by [`SynthesisProvider::synthesize`].
    fn encoding(&self) -> AudioEncoding;

    /// Issue one streaming synthesis call. The returned stream yields audio as
    /// it arrives; a non-success response is an `Err` before any bytes.
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<AudioByteStream>;
}

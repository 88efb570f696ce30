//! audio-cache: store finished audio under a key derived from its text and voice
//!
//! Writes happen after the live stream has been delivered and are plain
//! overwrites, so concurrent runs producing the same key need no locking.

mod error;
pub use error::{CacheError, Result};

mod key;
pub use key::{normalize_text, CacheKey};

mod types;
pub use types::{CacheAudio, CacheConfig, CacheRecord, KeySource};

mod store;
pub use store::{LocalDirStore, MemoryStore, ObjectStore};

mod sink;
pub use sink::CacheSink;

use audio_cache::CacheRecord;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Progress of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunState {
    pub run_id: Uuid,
    pub started_at: OffsetDateTime,
    pub segments_dispatched: usize,
    pub segments_failed: usize,
    pub bytes_streamed: u64,
    /// Raw token text received so far, directives included.
    pub transcript: String,
    /// Sum of the pauses requested by directives in dispatched segments.
    pub pause_seconds: f32,
    pub completed: bool,
    pub error: Option<String>,
    pub cache_url: Option<String>,
}

impl PipelineRunState {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: OffsetDateTime::now_utc(),
            segments_dispatched: 0,
            segments_failed: 0,
            bytes_streamed: 0,
            transcript: String::new(),
            pause_seconds: 0.0,
            completed: false,
            error: None,
            cache_url: None,
        }
    }

    /// True when at least one segment was skipped.
    pub fn degraded(&self) -> bool {
        self.segments_failed > 0
    }
}

type CacheTask = JoinHandle<Option<CacheRecord>>;

/// Shared view of a run, usable while the audio stream is being consumed.
#[derive(Clone)]
pub struct RunHandle {
    state: Arc<Mutex<PipelineRunState>>,
    cache_task: Arc<Mutex<Option<CacheTask>>>,
}

impl RunHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PipelineRunState::new())),
            cache_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn snapshot(&self) -> PipelineRunState {
        self.state.lock().clone()
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut PipelineRunState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub(crate) fn set_cache_task(&self, task: CacheTask) {
        *self.cache_task.lock() = Some(task);
    }

    /// Wait for the background cache write, if one was started.
    ///
    /// Returns the stored record once; later calls return `None`.
    pub async fn wait_for_cache(&self) -> Option<CacheRecord> {
        let task = self.cache_task.lock().take()?;
        task.await.ok().flatten()
    }
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("state", &self.snapshot())
            .field("cache_pending", &self.cache_task.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_detached() {
        let handle = RunHandle::new();
        handle.update(|s| s.transcript.push_str("Breathe."));
        let snap = handle.snapshot();
        handle.update(|s| s.segments_failed += 1);
        assert_eq!(snap.transcript, "Breathe.");
        assert!(!snap.degraded());
        assert!(handle.snapshot().degraded());
    }

    #[test]
    fn debug_shows_run_state() {
        let handle = RunHandle::new();
        let run_id = handle.snapshot().run_id;
        let printed = format!("{:?}", handle);
        assert!(printed.starts_with("RunHandle"));
        assert!(printed.contains(&run_id.to_string()));
        assert!(printed.contains("cache_pending: false"));
    }

    #[tokio::test]
    async fn no_cache_task_means_no_record() {
        assert!(RunHandle::new().wait_for_cache().await.is_none());
    }
}

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::warn;

/// Sees every token as it is consumed.
///
/// Calls arrive in token order on a blocking-pool thread, off the token path:
/// a slow or blocking observer delays only its own notifications. A panicking
/// observer is detached for the rest of the run; the run itself carries on.
pub trait TranscriptObserver: Send + Sync {
    fn on_token(&self, token: &str);

    /// The token source finished cleanly; `transcript` is everything it produced.
    fn on_complete(&self, _transcript: &str) {}
}

impl<F> TranscriptObserver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_token(&self, token: &str) {
        self(token)
    }
}

/// Forwards tokens over an unbounded channel, never waiting on the receiver.
pub struct ChannelObserver {
    tx: UnboundedSender<String>,
}

impl ChannelObserver {
    pub fn new(tx: UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl TranscriptObserver for ChannelObserver {
    fn on_token(&self, token: &str) {
        // receiver gone: nothing left to capture
        let _ = self.tx.send(token.to_string());
    }
}

enum ObserverEvent {
    Token(String),
    Complete(String),
}

/// Queues observer calls for a dedicated blocking task.
///
/// Sending never waits. Dropping the relay lets the task drain what is
/// queued and exit.
pub(crate) struct ObserverRelay {
    tx: UnboundedSender<ObserverEvent>,
}

impl ObserverRelay {
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(observer: Arc<dyn TranscriptObserver>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || {
            while let Some(event) = rx.blocking_recv() {
                let delivered = catch_unwind(AssertUnwindSafe(|| match &event {
                    ObserverEvent::Token(token) => observer.on_token(token),
                    ObserverEvent::Complete(transcript) => observer.on_complete(transcript),
                }));
                if delivered.is_err() {
                    warn!("transcript observer panicked, detaching it");
                    return;
                }
            }
        });
        Self { tx }
    }

    pub(crate) fn token(&self, token: &str) {
        // task gone: the observer was detached
        let _ = self.tx.send(ObserverEvent::Token(token.to_string()));
    }

    pub(crate) fn complete(&self, transcript: String) {
        let _ = self.tx.send(ObserverEvent::Complete(transcript));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(UnboundedSender<String>);

    impl TranscriptObserver for Recorder {
        fn on_token(&self, token: &str) {
            let _ = self.0.send(token.to_string());
        }

        fn on_complete(&self, transcript: &str) {
            let _ = self.0.send(format!("done: {transcript}"));
        }
    }

    #[tokio::test]
    async fn relay_delivers_in_order_then_releases_the_observer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let relay = ObserverRelay::spawn(Arc::new(Recorder(tx)));
        relay.token("Breathe ");
        relay.token("in.");
        relay.complete("Breathe in.".to_string());
        drop(relay);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        assert_eq!(seen, vec!["Breathe ", "in.", "done: Breathe in."]);
    }

    #[tokio::test]
    async fn panicking_observer_is_detached() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let relay = ObserverRelay::spawn(Arc::new(move |token: &str| {
            if token == "boom" {
                panic!("observer bug");
            }
            let _ = tx.send(token.to_string());
        }));
        relay.token("one");
        relay.token("boom");
        relay.token("two");
        drop(relay);

        let mut seen = Vec::new();
        while let Some(token) = rx.recv().await {
            seen.push(token);
        }
        assert_eq!(seen, vec!["one"]);
    }

    #[test]
    fn channel_observer_ignores_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let obs = ChannelObserver::new(tx);
        obs.on_token("a");
        drop(rx);
        obs.on_token("b");
    }
}

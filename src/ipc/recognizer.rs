//! Recognition source backed by an IPC client
//!
//! The client that sends `attach_recognizer` runs the actual recognizer.
//! Start and stop commands reach it as session events on the broadcast
//! channel; its callbacks come back as `recognition` requests. The
//! attachment lasts until that client detaches or disconnects.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::events::SessionEvent;
use crate::state::RecognitionSource;

#[derive(Debug, Default)]
struct Attachment {
    attached: AtomicBool,
    continuous: AtomicBool,
    /// Bumped on every attach so a stale owner cannot detach a newer client
    generation: AtomicU64,
}

/// Forwards recognizer commands to the attached client
#[derive(Debug, Clone)]
pub struct BroadcastRecognizer {
    attachment: Arc<Attachment>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastRecognizer {
    pub fn new(event_tx: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            attachment: Arc::new(Attachment::default()),
            event_tx,
        }
    }

    /// Attach a recognizer, returning the token that identifies this attachment
    pub fn attach(&self, continuous: bool) -> u64 {
        self.attachment
            .continuous
            .store(continuous, Ordering::SeqCst);
        let token = self.attachment.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.attachment.attached.store(true, Ordering::SeqCst);
        info!(continuous, token, "recognizer attached");
        token
    }

    pub fn detach(&self) {
        if self.attachment.attached.swap(false, Ordering::SeqCst) {
            info!("recognizer detached");
        }
    }

    /// Detach only if `token` is still the current attachment.
    /// Returns true if this call detached the recognizer.
    pub fn detach_if_current(&self, token: u64) -> bool {
        if self.attachment.generation.load(Ordering::SeqCst) != token {
            debug!(token, "recognizer was re-attached, keeping it");
            return false;
        }
        let detached = self.attachment.attached.swap(false, Ordering::SeqCst);
        if detached {
            info!(token, "recognizer client went away");
        }
        detached
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.attached.load(Ordering::SeqCst)
    }
}

impl RecognitionSource for BroadcastRecognizer {
    fn is_available(&self) -> bool {
        self.is_attached()
    }

    fn is_continuous(&self) -> bool {
        self.attachment.continuous.load(Ordering::SeqCst)
    }

    fn start(&self) -> anyhow::Result<()> {
        if !self.is_attached() {
            anyhow::bail!("no recognizer attached");
        }
        if self.event_tx.send(SessionEvent::RecognitionStartRequested).is_err() {
            debug!("start requested with no subscribers");
        }
        Ok(())
    }

    fn stop(&self) {
        if self.event_tx.send(SessionEvent::RecognitionStopRequested).is_err() {
            debug!("stop requested with no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_follows_attachment() {
        let (tx, _rx) = broadcast::channel(4);
        let recognizer = BroadcastRecognizer::new(tx);
        assert!(!recognizer.is_available());

        recognizer.attach(true);
        assert!(recognizer.is_available());
        assert!(recognizer.is_continuous());

        recognizer.detach();
        assert!(!recognizer.is_available());
    }

    #[test]
    fn test_start_and_stop_are_broadcast() {
        let (tx, mut rx) = broadcast::channel(4);
        let recognizer = BroadcastRecognizer::new(tx);
        assert!(recognizer.start().is_err());

        recognizer.attach(false);
        recognizer.start().unwrap();
        recognizer.stop();
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::RecognitionStartRequested);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::RecognitionStopRequested);
    }

    #[test]
    fn test_stale_owner_cannot_detach_newer_client() {
        let (tx, _rx) = broadcast::channel(4);
        let recognizer = BroadcastRecognizer::new(tx);
        let first = recognizer.attach(false);
        let second = recognizer.attach(true);
        assert_ne!(first, second);

        assert!(!recognizer.detach_if_current(first));
        assert!(recognizer.is_available());

        assert!(recognizer.detach_if_current(second));
        assert!(!recognizer.is_available());
        assert!(!recognizer.detach_if_current(second));
    }

    #[test]
    fn test_start_after_detach_fails() {
        let (tx, _rx) = broadcast::channel(4);
        let recognizer = BroadcastRecognizer::new(tx);
        let token = recognizer.attach(false);
        recognizer.start().unwrap();

        recognizer.detach_if_current(token);
        assert!(recognizer.start().is_err());
    }

    #[test]
    fn test_clones_share_attachment() {
        let (tx, _rx) = broadcast::channel(4);
        let recognizer = BroadcastRecognizer::new(tx);
        let for_session = recognizer.clone();
        recognizer.attach(false);
        assert!(for_session.is_available());
    }
}

use std::sync::{Mutex, PoisonError};

use tokio::sync::{mpsc, watch};

use super::api::WatchEvent;

/// Bounded event channel fed by the poll loop. Stopping closes the channel
/// exactly once, no matter how many callers race to do it.
pub struct PollWatcher {
    sender: Mutex<Option<mpsc::Sender<WatchEvent>>>,
    shutdown: watch::Sender<bool>,
}

impl PollWatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WatchEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown, _) = watch::channel(false);
        (
            Self {
                sender: Mutex::new(Some(tx)),
                shutdown,
            },
            rx,
        )
    }

    /// Closes the event channel. Returns `true` only for the call that
    /// actually closed it.
    pub fn stop(&self) -> bool {
        let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.take().is_none() {
            return false;
        }
        self.shutdown.send_replace(true);
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Resolves once `stop` has been called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Queues an event, waiting for buffer space. Returns `false` when the
    /// watcher is stopped or the receiving side is gone.
    pub async fn send(&self, event: WatchEvent) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn delivers_events_in_order() {
        let (watcher, mut events) = PollWatcher::new(4);
        assert!(watcher.send(WatchEvent::Deleted).await);
        assert!(watcher.send(WatchEvent::Error("boom".into())).await);
        assert_eq!(events.recv().await, Some(WatchEvent::Deleted));
        assert_eq!(events.recv().await, Some(WatchEvent::Error("boom".into())));
    }

    #[tokio::test]
    async fn stop_closes_channel_and_rejects_sends() {
        let (watcher, mut events) = PollWatcher::new(4);
        assert!(watcher.stop());
        assert!(watcher.is_stopped());
        assert!(!watcher.send(WatchEvent::Deleted).await);
        assert_eq!(events.recv().await, None);
    }

    #[test]
    fn concurrent_stops_close_exactly_once() {
        let (watcher, _events) = PollWatcher::new(1);
        let watcher = Arc::new(watcher);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let watcher = Arc::clone(&watcher);
                std::thread::spawn(move || watcher.stop())
            })
            .collect();
        let closed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|closed| *closed)
            .count();
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn shutdown_signal_fires_on_stop() {
        let (watcher, _events) = PollWatcher::new(1);
        let mut signal = watcher.shutdown_signal();
        watcher.stop();
        signal.changed().await.unwrap();
        assert!(*signal.borrow());
    }
}

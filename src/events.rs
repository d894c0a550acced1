use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;

/// Completion and error notifications. Job events are raised from worker
/// threads; consumers must not assume a particular calling thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    UploadComplete { local: PathBuf, remote: String },
    UploadError { local: PathBuf, remote: String, error: String, attempts: u32 },
    DownloadComplete { remote: String, local: PathBuf },
    DownloadError { remote: String, local: PathBuf, error: String, attempts: u32 },
    DeleteDirectoryComplete { path: String },
    DeleteDirectoryError { path: String, error: String, attempts: u32 },
    ConnectivityProgress { message: String, user_state: Option<String> },
}

impl TransferEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TransferEvent::UploadError { .. }
                | TransferEvent::DownloadError { .. }
                | TransferEvent::DeleteDirectoryError { .. }
        )
    }
}

/// Observer registration. Implemented for any `Fn(&TransferEvent)` closure.
pub trait TransferObserver: Send + Sync {
    fn on_event(&self, event: &TransferEvent);
}

impl<F> TransferObserver for F
where
    F: Fn(&TransferEvent) + Send + Sync,
{
    fn on_event(&self, event: &TransferEvent) {
        self(event)
    }
}

/// Fan-out point for events: registered observers run inline, channel
/// subscribers receive a clone.
#[derive(Default)]
pub struct EventHub {
    observers: RwLock<Vec<Arc<dyn TransferObserver>>>,
    subscribers: Mutex<Vec<Sender<TransferEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn TransferObserver>) {
        self.observers.write().unwrap_or_else(PoisonError::into_inner).push(observer);
    }

    /// Receive every subsequent event on a channel. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> Receiver<TransferEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        rx
    }

    pub fn emit(&self, event: TransferEvent) {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner).clone();
        for obs in &observers {
            obs.on_event(&event);
        }
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn observers_and_subscribers_both_receive() {
        let hub = EventHub::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        hub.register(Arc::new(move |_: &TransferEvent| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }));
        let rx = hub.subscribe();
        hub.emit(TransferEvent::DeleteDirectoryComplete { path: "d".into() });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_recv().unwrap(), TransferEvent::DeleteDirectoryComplete { path: "d".into() });
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let hub = EventHub::new();
        let rx = hub.subscribe();
        drop(rx);
        hub.emit(TransferEvent::DeleteDirectoryComplete { path: "d".into() });
        assert!(hub.subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn serializes_with_tag() {
        let ev = TransferEvent::UploadError {
            local: "/tmp/a".into(),
            remote: "r/a".into(),
            error: "boom".into(),
            attempts: 2,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "upload_error");
        assert_eq!(v["attempts"], 2);
        assert!(ev.is_error());
    }
}

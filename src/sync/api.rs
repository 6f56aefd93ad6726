use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use thiserror::Error;

use super::store::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observation produced by one poll of the synchronized secret.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent {
    Added(Secret),
    Modified(Secret),
    Deleted,
    Error(String),
}

impl WatchEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WatchEvent::Added(_) => EventKind::Added,
            WatchEvent::Modified(_) => EventKind::Modified,
            WatchEvent::Deleted => EventKind::Deleted,
            WatchEvent::Error(_) => EventKind::Error,
        }
    }

    pub fn secret(&self) -> Option<&Secret> {
        match self {
            WatchEvent::Added(secret) | WatchEvent::Modified(secret) => Some(secret),
            WatchEvent::Deleted | WatchEvent::Error(_) => None,
        }
    }
}

/// Callback invoked for every dispatched event of the kind it was registered
/// for. Runs on the synchronizer's task and must not call back into
/// `Synchronizer::stop`.
pub type Listener = Arc<dyn Fn(&WatchEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("synchronizer is already running")]
    AlreadyRunning,
    #[error("synchronizer has been stopped")]
    Stopped,
    #[error("watch for {name} reported an error: {message}")]
    Watch { name: String, message: String },
    #[error("watch for {name} ended unexpectedly")]
    WatchTerminated { name: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

//! Poll-driven synchronization of a single versioned secret.

pub mod api;
pub mod store;
pub mod synchronizer;
pub mod watcher;

pub use api::{EventKind, Listener, SyncError, SyncState, WatchEvent};
pub use store::{KubeSecretStore, MemorySecretStore, SecretStore, StoreError};
pub use synchronizer::{Synchronizer, DEFAULT_SYNC_INTERVAL};
pub use watcher::PollWatcher;

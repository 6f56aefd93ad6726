use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::api::{EventKind, Listener, SyncError, SyncState, WatchEvent};
use super::store::SecretStore;
use super::watcher::PollWatcher;

/// Default delay between two polls of the synchronized secret.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

const EVENT_BUFFER: usize = 8;

/// Last observed state of the secret.
#[derive(Clone, Debug, PartialEq)]
enum Observed {
    Unknown,
    Absent,
    Present(Secret),
}

/// Emulates a change watch over a single secret by polling it on a fixed
/// interval and dispatching change events to registered listeners.
///
/// Lifecycle: `Idle` -> `start` -> `Running` -> `stop` -> `Stopped`. Stopping
/// is idempotent and guarantees no listener runs after it returns.
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

struct Inner {
    namespace: String,
    name: String,
    interval: Duration,
    store: Arc<dyn SecretStore>,
    // Held for the whole of a dispatch so `stop` cannot interleave with one.
    state: Mutex<SyncState>,
    snapshot: Mutex<Observed>,
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
    watcher: Mutex<Option<Arc<PollWatcher>>>,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn SecretStore>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::with_interval(store, namespace, name, DEFAULT_SYNC_INTERVAL)
    }

    pub fn with_interval(
        store: Arc<dyn SecretStore>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                namespace: namespace.into(),
                name: name.into(),
                interval,
                store,
                state: Mutex::new(SyncState::Idle),
                snapshot: Mutex::new(Observed::Unknown),
                listeners: RwLock::new(HashMap::new()),
                watcher: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> String {
        self.inner.display_name()
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn state(&self) -> SyncState {
        *self.inner.lock_state()
    }

    /// Registers `listener` for every future dispatch of `kind`.
    pub fn register<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&WatchEvent) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Snapshot of the secret as last observed, if it exists.
    pub fn get(&self) -> Option<Secret> {
        match &*self.inner.lock_snapshot() {
            Observed::Present(secret) => Some(secret.clone()),
            Observed::Unknown | Observed::Absent => None,
        }
    }

    /// Spawns the poll loop and returns the channel on which loop failures
    /// are reported. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<mpsc::Receiver<SyncError>, SyncError> {
        let mut state = self.inner.lock_state();
        match *state {
            SyncState::Idle => {}
            SyncState::Running => return Err(SyncError::AlreadyRunning),
            SyncState::Stopped => return Err(SyncError::Stopped),
        }

        let (watcher, events) = PollWatcher::new(EVENT_BUFFER);
        let watcher = Arc::new(watcher);
        *self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&watcher));
        let (errors_tx, errors_rx) = mpsc::channel(1);

        tokio::spawn(poll(Arc::clone(&self.inner), Arc::clone(&watcher)));
        tokio::spawn(dispatch(Arc::clone(&self.inner), watcher, events, errors_tx));

        *state = SyncState::Running;
        info!(
            namespace = %self.inner.namespace,
            name = %self.inner.name,
            interval_secs = self.inner.interval.as_secs(),
            "starting secret synchronizer"
        );
        Ok(errors_rx)
    }

    /// Moves to `Stopped` and closes event delivery. Returns `true` only for
    /// the call that performed the transition.
    pub fn stop(&self) -> bool {
        let mut state = self.inner.lock_state();
        if *state == SyncState::Stopped {
            return false;
        }
        *state = SyncState::Stopped;
        if let Some(watcher) = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.stop();
        }
        info!(name = %self.inner.display_name(), "secret synchronizer stopped");
        true
    }

    /// Fetches the secret immediately, outside the poll schedule. Failures are
    /// logged and the previous snapshot is kept.
    pub async fn refresh(&self) {
        let inner = &self.inner;
        match inner.store.get(&inner.namespace, &inner.name).await {
            Ok(Some(secret)) => {
                let state = inner.lock_state();
                if *state == SyncState::Stopped {
                    return;
                }
                if inner.update(&secret) {
                    inner.notify(&WatchEvent::Added(secret));
                }
            }
            Ok(None) => {
                warn!(name = %inner.display_name(), "secret synchronizer found no secret to refresh from");
            }
            Err(err) => {
                warn!(?err, name = %inner.display_name(), "secret synchronizer failed to refresh secret");
            }
        }
    }

    /// Creates the secret under this synchronizer's namespace and name.
    pub async fn create(&self, mut secret: Secret) -> Result<(), SyncError> {
        secret.metadata.name = Some(self.inner.name.clone());
        secret.metadata.namespace = Some(self.inner.namespace.clone());
        self.inner
            .store
            .create(&self.inner.namespace, &secret)
            .await?;
        info!(name = %self.inner.display_name(), "created synchronized secret");
        Ok(())
    }
}

impl Inner {
    fn display_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, Observed> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_event(&self) -> WatchEvent {
        // Every successful fetch surfaces as Added; Modified is never produced
        // by polling.
        match self.store.get(&self.namespace, &self.name).await {
            Ok(Some(secret)) => WatchEvent::Added(secret),
            Ok(None) => WatchEvent::Deleted,
            Err(err) => WatchEvent::Error(err.to_string()),
        }
    }

    /// Applies an event to the snapshot and notifies listeners. `Added` and
    /// `Modified` are dropped when they match the snapshot or are older than
    /// it; `Deleted` is dispatched on every poll that finds the secret
    /// missing. `Error` events are always dispatched and then escalated.
    fn handle_event(&self, event: WatchEvent) -> Result<(), SyncError> {
        let state = self.lock_state();
        if *state == SyncState::Stopped {
            return Ok(());
        }

        let changed = match &event {
            WatchEvent::Added(secret) | WatchEvent::Modified(secret) => self.update(secret),
            WatchEvent::Deleted => {
                self.clear();
                true
            }
            WatchEvent::Error(_) => true,
        };
        if !changed {
            debug!(name = %self.display_name(), kind = %event.kind(), "secret unchanged");
            return Ok(());
        }
        self.notify(&event);

        match event {
            WatchEvent::Error(message) => Err(SyncError::Watch {
                name: self.display_name(),
                message,
            }),
            _ => Ok(()),
        }
    }

    fn update(&self, secret: &Secret) -> bool {
        let mut snapshot = self.lock_snapshot();
        if let Observed::Present(current) = &*snapshot {
            if current == secret {
                return false;
            }
            // A poll result queued before a refresh must not roll it back.
            if let (Some(current), Some(incoming)) =
                (resource_version(current), resource_version(secret))
            {
                if incoming < current {
                    debug!(name = %self.display_name(), "ignoring stale secret snapshot");
                    return false;
                }
            }
        }
        *snapshot = Observed::Present(secret.clone());
        true
    }

    fn clear(&self) {
        *self.lock_snapshot() = Observed::Absent;
    }

    fn notify(&self, event: &WatchEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        debug!(
            name = %self.display_name(),
            kind = %event.kind(),
            listeners = listeners.len(),
            "dispatching secret event"
        );
        for listener in listeners {
            listener(event);
        }
    }

    fn is_stopped(&self) -> bool {
        *self.lock_state() == SyncState::Stopped
    }
}

fn resource_version(secret: &Secret) -> Option<u64> {
    secret.metadata.resource_version.as_deref()?.parse().ok()
}

async fn poll(inner: Arc<Inner>, watcher: Arc<PollWatcher>) {
    let mut shutdown = watcher.shutdown_signal();
    let mut ticker = time::interval(inner.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if watcher.is_stopped() {
            break;
        }
        let event = inner.fetch_event().await;
        if !watcher.send(event).await {
            break;
        }
    }
    debug!(name = %inner.display_name(), "secret poll loop exited");
}

async fn dispatch(
    inner: Arc<Inner>,
    watcher: Arc<PollWatcher>,
    mut events: mpsc::Receiver<WatchEvent>,
    errors: mpsc::Sender<SyncError>,
) {
    loop {
        let Some(event) = events.recv().await else {
            if !inner.is_stopped() {
                let _ = errors
                    .send(SyncError::WatchTerminated {
                        name: inner.display_name(),
                    })
                    .await;
            }
            break;
        };
        if let Err(err) = inner.handle_event(event) {
            warn!(%err, name = %inner.display_name(), "secret synchronizer loop failed");
            let _ = errors.send(err).await;
            break;
        }
    }
    watcher.stop();
}

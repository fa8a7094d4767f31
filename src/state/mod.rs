/// Viewer connection registry.
pub mod viewers;

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, watch};

use crate::{
    cache::CacheStore, config::AppConfig, dao::storage::LeaderboardStore,
    dto::ws::LeaderboardUpdateEvent, error::ServiceError,
};

pub use self::viewers::{ViewerConnection, ViewerRegistry};

/// Cheaply clonable handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, cache, viewer registry and
/// the broadcast queue.
pub struct AppState {
    config: AppConfig,
    store: RwLock<Option<Arc<dyn LeaderboardStore>>>,
    cache: Arc<dyn CacheStore>,
    viewers: ViewerRegistry,
    updates: mpsc::UnboundedSender<LeaderboardUpdateEvent>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct the shared state together with the receiving end of the
    /// broadcast queue, which the broadcast service consumes.
    ///
    /// The application starts in degraded mode until a storage backend is
    /// installed.
    pub fn new(
        config: AppConfig,
        cache: Arc<dyn CacheStore>,
    ) -> (SharedState, mpsc::UnboundedReceiver<LeaderboardUpdateEvent>) {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (degraded_tx, _rx) = watch::channel(true);
        let state = Arc::new(Self {
            config,
            store: RwLock::new(None),
            cache,
            viewers: ViewerRegistry::default(),
            updates: updates_tx,
            degraded: degraded_tx,
        });
        (state, updates_rx)
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current storage backend, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn LeaderboardStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Storage backend or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn LeaderboardStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a storage backend and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn LeaderboardStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the storage backend and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }
        let _ = self.degraded.send(value);
    }

    /// Best-effort cache layered over storage reads.
    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    /// Registry of live viewer sockets keyed by viewing player id.
    pub fn viewers(&self) -> &ViewerRegistry {
        &self.viewers
    }

    /// Enqueue an update event for fan-out without waiting for delivery.
    ///
    /// Never blocks and never fails the caller; if the broadcast service is
    /// gone the event is dropped.
    pub fn publish_update(&self, event: LeaderboardUpdateEvent) {
        let _ = self.updates.send(event);
    }
}

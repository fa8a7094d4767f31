//! Background supervision of the storage backend.
//!
//! The HTTP surface starts serving before storage is up; until the first
//! successful connection the application runs degraded and write paths are
//! rejected. The supervisor owns connecting, health polling and reconnects,
//! and toggles the shared state between normal and degraded mode.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::storage::{LeaderboardStore, StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to storage and keep the shared state's degraded flag truthful.
///
/// Loops forever: connect with exponential backoff, install the store, poll
/// its health, and on failure pull the store out of the shared state so
/// callers degrade immediately, then attempt bounded reconnects before
/// falling back to a fresh connection.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn LeaderboardStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                supervise_store(&state, store).await;

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll an installed store until its health cannot be restored.
///
/// Returns once reconnect attempts are exhausted, leaving the state
/// degraded; the caller then starts over with a fresh connection.
async fn supervise_store(state: &SharedState, store: Arc<dyn LeaderboardStore>) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("storage healthy again; leaving degraded mode");
                    state.install_store(store.clone()).await;
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                state.clear_store().await;

                if reconnect_with_backoff(store.as_ref()).await {
                    state.install_store(store.clone()).await;
                    info!("storage reconnection succeeded; leaving degraded mode");
                    sleep(HEALTH_POLL_INTERVAL).await;
                } else {
                    warn!("exhausted storage reconnect attempts; staying in degraded mode");
                    return;
                }
            }
        }
    }
}

async fn reconnect_with_backoff(store: &dyn LeaderboardStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;
    use crate::{
        cache::memory::MemoryCache, config::AppConfig, dao::memory::MemoryStore, state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn retries_until_a_connection_succeeds() {
        let (state, _updates) = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        assert!(state.is_degraded().await);

        let attempts = Arc::new(AtomicU32::new(0));
        let connect_attempts = Arc::clone(&attempts);
        let supervisor = tokio::spawn(run(Arc::clone(&state), move || {
            let attempts = Arc::clone(&connect_attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StorageError::unavailable(
                        "backend still booting".into(),
                        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                    ))
                } else {
                    Ok(Arc::new(MemoryStore::new()) as Arc<dyn LeaderboardStore>)
                }
            }
        }));

        // Two failures back off 1s then 2s before the third attempt lands.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!state.is_degraded().await);
        assert!(attempts.load(Ordering::SeqCst) >= 3);

        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_connection_leaves_degraded_mode() {
        let (state, _updates) = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));

        let supervisor = tokio::spawn(run(Arc::clone(&state), move || async move {
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn LeaderboardStore>)
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!state.is_degraded().await);

        supervisor.abort();
    }
}

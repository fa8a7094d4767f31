use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the current health payload while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let connections = state.viewers().connection_count();
    if state.is_degraded().await {
        HealthResponse::degraded(connections)
    } else {
        HealthResponse::ok(connections)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        cache::memory::MemoryCache, config::AppConfig, dao::memory::MemoryStore, state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_storage_is_installed() {
        let (state, _updates) = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        assert_eq!(health_status(&state).await.status, "degraded");

        state.install_store(Arc::new(MemoryStore::new())).await;
        let healthy = health_status(&state).await;
        assert_eq!(healthy.status, "ok");
        assert_eq!(healthy.active_connections, 0);
    }
}

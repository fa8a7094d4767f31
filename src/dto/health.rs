use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of live viewer WebSocket connections.
    pub active_connections: usize,
}

impl HealthResponse {
    /// Health response for a fully operational backend.
    pub fn ok(active_connections: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_connections,
        }
    }

    /// Health response while running without a storage backend.
    pub fn degraded(active_connections: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            active_connections,
        }
    }
}

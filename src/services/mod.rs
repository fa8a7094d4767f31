/// Fan-out of leaderboard events to connected viewers.
pub mod broadcast_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Cache-first leaderboard read paths.
pub mod query;
/// Dense rank computation.
pub mod rank;
/// Periodic batch rank reconciliation.
pub mod reconcile;
/// Storage connection supervision and degraded mode handling.
pub mod storage_supervisor;
/// Atomic score submission pipeline.
pub mod submission;
/// WebSocket connection and message handling service.
pub mod websocket_service;

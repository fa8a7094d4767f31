//! Library crate for leaderboard-back, exposing modules for binaries and integration tests.

/// Best-effort cache layer.
pub mod cache;
/// Environment-driven configuration.
pub mod config;
/// Storage backends and database models.
pub mod dao;
/// REST and WebSocket wire schemas.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Business logic services.
pub mod services;
/// Shared application state.
pub mod state;

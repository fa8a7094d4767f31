/// Health check response payloads.
pub mod health;
/// Leaderboard REST request/response schemas.
pub mod leaderboard;
/// WebSocket wire events.
pub mod ws;

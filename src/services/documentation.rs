use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the leaderboard backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::leaderboard::submit_score,
        crate::routes::leaderboard::get_top,
        crate::routes::leaderboard::get_user_rank,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::leaderboard::ScoreSubmitRequest,
            crate::dto::leaderboard::ScoreSubmitResponse,
            crate::dto::leaderboard::LeaderboardEntry,
            crate::dto::leaderboard::LeaderboardTopResponse,
            crate::dto::leaderboard::UserRankResponse,
            crate::dto::ws::LeaderboardUpdateEvent,
            crate::dto::ws::LeaderboardSnapshotEvent,
            crate::dao::models::GameMode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "leaderboard", description = "Score submission and rank queries"),
        (name = "viewers", description = "WebSocket stream of live leaderboard updates"),
    )
)]
pub struct ApiDoc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::leaderboard::{
        LeaderboardTopResponse, ScoreSubmitRequest, ScoreSubmitResponse, TopQuery,
        UserRankResponse,
    },
    error::AppError,
    services::{query, submission},
    state::SharedState,
};

/// Score submission and rank query endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/leaderboard/submit", post(submit_score))
        .route("/api/leaderboard/top", get(get_top))
        .route("/api/leaderboard/rank/{player_id}", get(get_user_rank))
}

#[utoipa::path(
    post,
    path = "/api/leaderboard/submit",
    tag = "leaderboard",
    request_body = ScoreSubmitRequest,
    responses(
        (status = 200, description = "Score recorded and ranks updated", body = ScoreSubmitResponse),
        (status = 400, description = "Invalid submission payload"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Record a game score and return the player's updated standing.
pub async fn submit_score(
    State(state): State<SharedState>,
    Json(request): Json<ScoreSubmitRequest>,
) -> Result<Json<ScoreSubmitResponse>, AppError> {
    let payload = submission::submit_score(&state, request).await?;
    Ok(Json(payload))
}

#[utoipa::path(
    get,
    path = "/api/leaderboard/top",
    tag = "leaderboard",
    params(TopQuery),
    responses(
        (status = 200, description = "Requested leaderboard page", body = LeaderboardTopResponse),
        (status = 400, description = "Limit outside 1..=1000"),
        (status = 503, description = "Storage unavailable and page not cached")
    )
)]
/// Return one page of the leaderboard in descending score order.
pub async fn get_top(
    State(state): State<SharedState>,
    Query(params): Query<TopQuery>,
) -> Result<Json<LeaderboardTopResponse>, AppError> {
    params.validate()?;
    let limit = params.limit.unwrap_or(state.config().top_n);
    let offset = params.offset.unwrap_or(0);
    let payload = query::get_top(&state, limit, offset).await?;
    Ok(Json(payload))
}

#[utoipa::path(
    get,
    path = "/api/leaderboard/rank/{player_id}",
    tag = "leaderboard",
    params(("player_id" = i64, Path, description = "Player to look up")),
    responses(
        (status = 200, description = "Player's current standing", body = UserRankResponse),
        (status = 404, description = "Player has no leaderboard entry"),
        (status = 503, description = "Storage unavailable and rank not cached")
    )
)]
/// Return one player's rank, total score, and percentile.
pub async fn get_user_rank(
    State(state): State<SharedState>,
    Path(player_id): Path<i64>,
) -> Result<Json<UserRankResponse>, AppError> {
    let payload = query::get_user_rank(&state, player_id).await?;
    Ok(Json(payload))
}

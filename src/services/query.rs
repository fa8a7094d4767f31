//! Read paths: cached top-N pages and per-player rank views.

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{
    cache::{top_leaderboard_key, user_rank_key},
    dto::leaderboard::{LeaderboardEntry, LeaderboardTopResponse, UserRankResponse},
    error::ServiceError,
    state::SharedState,
};

/// Fetch one page of the leaderboard, cache first.
///
/// On a miss the full active set is read in score order and ranks are
/// assigned densely while walking it, so tied totals share a rank and the
/// next distinct total resumes at its positional index. The rendered page
/// is cached before returning.
pub async fn get_top(
    state: &SharedState,
    limit: usize,
    offset: usize,
) -> Result<LeaderboardTopResponse, ServiceError> {
    let key = top_leaderboard_key(limit, offset);
    if let Some(cached) = state.cache().get(&key).await {
        match serde_json::from_str::<Vec<LeaderboardEntry>>(&cached) {
            Ok(entries) => {
                debug!(%key, "leaderboard page served from cache");
                return Ok(page_response(entries));
            }
            Err(err) => {
                warn!(%key, error = %err, "discarding undecodable cached page");
                state.cache().delete(&key).await;
            }
        }
    }

    let store = state.require_store().await?;
    let mut session = store.begin().await?;
    let records = session.active_entries_by_score().await?;
    session.rollback().await?;

    let mut entries = Vec::with_capacity(limit.min(records.len()));
    let mut display_rank = 0;
    let mut previous_score = None;
    for (index, record) in records.iter().enumerate() {
        if previous_score != Some(record.total_score) {
            display_rank = (index + 1) as i64;
            previous_score = Some(record.total_score);
        }
        if index >= offset {
            if entries.len() == limit {
                break;
            }
            entries.push(LeaderboardEntry::from_record(display_rank, record));
        }
    }

    if let Ok(payload) = serde_json::to_string(&entries) {
        state
            .cache()
            .set(&key, payload, state.config().leaderboard_cache_ttl)
            .await;
    }

    Ok(page_response(entries))
}

fn page_response(entries: Vec<LeaderboardEntry>) -> LeaderboardTopResponse {
    LeaderboardTopResponse {
        total_entries: entries.len(),
        entries,
        timestamp: OffsetDateTime::now_utc(),
    }
}

/// Fetch one player's rank view, cache first.
///
/// The percentile is the share of active players this player outranks,
/// derived from the stored rank rather than recomputed.
pub async fn get_user_rank(
    state: &SharedState,
    player_id: i64,
) -> Result<UserRankResponse, ServiceError> {
    let key = user_rank_key(player_id);
    if let Some(cached) = state.cache().get(&key).await {
        match serde_json::from_str::<UserRankResponse>(&cached) {
            Ok(response) => {
                debug!(%key, "rank view served from cache");
                return Ok(response);
            }
            Err(err) => {
                warn!(%key, error = %err, "discarding undecodable cached rank view");
                state.cache().delete(&key).await;
            }
        }
    }

    let store = state.require_store().await?;
    let mut session = store.begin().await?;
    let record = session.entry_with_player(player_id).await?;
    let active = session.count_active().await?;
    session.rollback().await?;

    let record = record.ok_or_else(|| {
        ServiceError::NotFound(format!("player {player_id} has no leaderboard entry"))
    })?;

    let percentile = if active > 0 {
        (active - record.rank) as f64 / active as f64 * 100.0
    } else {
        0.0
    };
    let response = UserRankResponse {
        player_id: record.player_id,
        username: record.username,
        rank: record.rank,
        total_score: record.total_score,
        games_played: record.games_played,
        win_rate: record.win_rate,
        percentile,
        last_updated: record.last_updated,
    };

    if let Ok(payload) = serde_json::to_string(&response) {
        state
            .cache()
            .set(&key, payload, state.config().user_rank_cache_ttl)
            .await;
    }

    Ok(response)
}

//! Atomic score submission pipeline.

use time::OffsetDateTime;
use tracing::{info, warn};
use validator::Validate;

use crate::{
    cache::{TOP_LEADERBOARD_PREFIX, USER_RANK_PREFIX},
    dao::{
        models::{LeaderboardEntryEntity, NewGameSession, PlayerEntity},
        storage::StorageSession,
    },
    dto::{
        leaderboard::{ScoreSubmitRequest, ScoreSubmitResponse},
        ws::LeaderboardUpdateEvent,
    },
    error::ServiceError,
    services::rank,
    state::SharedState,
};

/// Submit a score and atomically update the player's leaderboard standing.
///
/// The whole write sequence — player auto-provisioning, the session record,
/// the aggregate update and the rank recompute — commits as one
/// transaction. Afterwards every cached leaderboard view is invalidated and
/// an update event is queued for fan-out; neither step can fail the
/// submission, and the response does not wait for any viewer to receive the
/// event.
pub async fn submit_score(
    state: &SharedState,
    request: ScoreSubmitRequest,
) -> Result<ScoreSubmitResponse, ServiceError> {
    request.validate()?;

    let store = state.require_store().await?;
    let now = OffsetDateTime::now_utc();

    let mut session = store.begin().await?;
    let outcome = apply_submission(session.as_mut(), &request, now).await;
    let submitted = match outcome {
        Ok(submitted) => {
            session.commit().await?;
            submitted
        }
        Err(err) => {
            if let Err(rollback_err) = session.rollback().await {
                warn!(error = %rollback_err, "rollback after failed submission also failed");
            }
            return Err(err);
        }
    };

    invalidate_leaderboard_cache(state).await;

    let rank_change = submitted
        .old_rank
        .map_or(0, |old_rank| old_rank - submitted.new_rank);
    info!(
        player_id = request.player_id,
        score = request.score,
        new_rank = submitted.new_rank,
        old_rank = ?submitted.old_rank,
        "score submitted"
    );

    state.publish_update(LeaderboardUpdateEvent::new(
        request.player_id,
        submitted.username,
        submitted.new_rank,
        submitted.old_rank,
        submitted.total_score,
        rank_change,
        now,
    ));

    Ok(ScoreSubmitResponse {
        session_id: submitted.session_id,
        player_id: request.player_id,
        score: request.score,
        new_total_score: submitted.total_score,
        new_rank: submitted.new_rank,
        rank_change,
        message: ScoreSubmitResponse::message_for(submitted.new_rank, rank_change),
    })
}

struct Submitted {
    session_id: i64,
    username: String,
    total_score: f64,
    new_rank: i64,
    old_rank: Option<i64>,
}

/// Run the five write steps inside the caller's transaction.
async fn apply_submission(
    session: &mut dyn StorageSession,
    request: &ScoreSubmitRequest,
    now: OffsetDateTime,
) -> Result<Submitted, ServiceError> {
    let username = match session.find_player(request.player_id).await? {
        Some(player) => {
            session.touch_player(player.id, now).await?;
            player.username
        }
        None => {
            let player = PlayerEntity::provisioned(request.player_id, now);
            session.insert_player(player.clone()).await?;
            info!(player_id = player.id, "auto-provisioned player");
            player.username
        }
    };

    let session_id = session
        .insert_game_session(NewGameSession {
            player_id: request.player_id,
            score: request.score,
            game_mode: request.game_mode,
            duration_ms: request.duration_ms,
            metadata: request.metadata.as_ref().map(ToString::to_string),
            created_at: now,
        })
        .await?;

    // The entry lookup locks the player's row, serializing concurrent
    // submissions for the same player through steps 3-4.
    let (entry, old_rank) = match session.find_entry(request.player_id).await? {
        Some(mut entry) => {
            let old_rank = entry.rank;
            entry.total_score += request.score;
            entry.games_played += 1;
            entry.last_updated = now;
            (entry, Some(old_rank))
        }
        None => (
            LeaderboardEntryEntity {
                player_id: request.player_id,
                total_score: request.score,
                games_played: 1,
                win_rate: 0.0,
                rank: 1,
                is_active: true,
                last_updated: now,
            },
            None,
        ),
    };
    let total_score = entry.total_score;
    session.upsert_entry(entry).await?;

    // Recompute against the post-update totals, own write included.
    let new_rank = rank::calculate_rank(session, request.player_id).await?;
    session.update_rank(request.player_id, new_rank).await?;

    Ok(Submitted {
        session_id,
        username,
        total_score,
        new_rank,
        old_rank,
    })
}

/// Drop every cached top-N page and per-player rank view.
///
/// Invalidation is deliberately coarse: a single submission can shift every
/// rank, so precision would buy staleness.
async fn invalidate_leaderboard_cache(state: &SharedState) {
    state.cache().delete_by_prefix(TOP_LEADERBOARD_PREFIX).await;
    state.cache().delete_by_prefix(USER_RANK_PREFIX).await;
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        cache::{memory::MemoryCache, top_leaderboard_key, user_rank_key},
        config::AppConfig,
        dao::{memory::MemoryStore, models::GameMode},
        state::AppState,
    };

    async fn test_state() -> (
        SharedState,
        mpsc::UnboundedReceiver<LeaderboardUpdateEvent>,
    ) {
        let (state, updates) = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        state.install_store(Arc::new(MemoryStore::new())).await;
        (state, updates)
    }

    fn request(player_id: i64, score: f64) -> ScoreSubmitRequest {
        ScoreSubmitRequest {
            player_id,
            score,
            game_mode: GameMode::Classic,
            duration_ms: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn first_submission_provisions_player_and_entry() {
        let (state, _updates) = test_state().await;

        let response = submit_score(&state, request(42, 1000.0)).await.unwrap();
        assert_eq!(response.new_total_score, 1000.0);
        assert_eq!(response.new_rank, 1);
        assert_eq!(response.rank_change, 0);
        assert!(response.session_id > 0);

        let store = state.require_store().await.unwrap();
        let mut session = store.begin().await.unwrap();
        let player = session.find_player(42).await.unwrap().unwrap();
        assert_eq!(player.username, "Player_42");
        let entry = session.find_entry(42).await.unwrap().unwrap();
        assert_eq!(entry.games_played, 1);
        assert_eq!(entry.total_score, 1000.0);
    }

    #[tokio::test]
    async fn totals_accumulate_across_submissions() {
        let (state, _updates) = test_state().await;

        submit_score(&state, request(1, 500.0)).await.unwrap();
        submit_score(&state, request(1, 300.0)).await.unwrap();
        let response = submit_score(&state, request(1, 200.0)).await.unwrap();

        assert_eq!(response.new_total_score, 1000.0);

        let store = state.require_store().await.unwrap();
        let mut session = store.begin().await.unwrap();
        let entry = session.find_entry(1).await.unwrap().unwrap();
        assert_eq!(entry.total_score, 1000.0);
        assert_eq!(entry.games_played, 3);
    }

    #[tokio::test]
    async fn three_players_rank_by_descending_total() {
        let (state, _updates) = test_state().await;

        submit_score(&state, request(1, 1000.0)).await.unwrap();
        submit_score(&state, request(2, 1500.0)).await.unwrap();
        submit_score(&state, request(3, 800.0)).await.unwrap();

        let store = state.require_store().await.unwrap();
        let mut session = store.begin().await.unwrap();
        assert_eq!(session.find_entry(2).await.unwrap().unwrap().rank, 1);
        assert_eq!(session.find_entry(1).await.unwrap().unwrap().rank, 2);
        assert_eq!(session.find_entry(3).await.unwrap().unwrap().rank, 3);
    }

    #[tokio::test]
    async fn tied_totals_report_the_same_rank() {
        let (state, _updates) = test_state().await;

        let first = submit_score(&state, request(1, 5000.0)).await.unwrap();
        let second = submit_score(&state, request(2, 5000.0)).await.unwrap();

        assert_eq!(first.new_rank, 1);
        assert_eq!(second.new_rank, 1);

        let store = state.require_store().await.unwrap();
        let mut session = store.begin().await.unwrap();
        let one = session.find_entry(1).await.unwrap().unwrap();
        let two = session.find_entry(2).await.unwrap().unwrap();
        assert_eq!(one.total_score, two.total_score);
        assert_eq!(one.rank, 1);
        assert_eq!(two.rank, 1);
    }

    #[tokio::test]
    async fn rank_change_tracks_movement() {
        let (state, _updates) = test_state().await;

        submit_score(&state, request(1, 100.0)).await.unwrap();
        submit_score(&state, request(2, 200.0)).await.unwrap();

        // Player 1 still holds its stored rank 1 from before player 2
        // overtook; a small submission re-ranks it to 2.
        let worsened = submit_score(&state, request(1, 50.0)).await.unwrap();
        assert_eq!(worsened.new_rank, 2);
        assert_eq!(worsened.rank_change, -1);

        // A big submission moves player 1 back to the top.
        let improved = submit_score(&state, request(1, 1000.0)).await.unwrap();
        assert_eq!(improved.new_rank, 1);
        assert_eq!(improved.rank_change, 1);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_mutation() {
        let (state, mut updates) = test_state().await;

        for bad in [request(1, 0.0), request(1, -10.0), request(0, 100.0)] {
            let err = submit_score(&state, bad).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }

        let store = state.require_store().await.unwrap();
        let mut session = store.begin().await.unwrap();
        assert!(session.find_player(1).await.unwrap().is_none());
        assert_eq!(session.count_active().await.unwrap(), 0);
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn degraded_mode_rejects_submissions() {
        let (state, _updates) =
            AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let err = submit_score(&state, request(1, 100.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn each_submission_publishes_exactly_one_event() {
        let (state, mut updates) = test_state().await;

        submit_score(&state, request(7, 900.0)).await.unwrap();
        let event = updates.try_recv().unwrap();
        assert_eq!(event.event_type, "leaderboard_update");
        assert_eq!(event.player_id, 7);
        assert_eq!(event.username, "Player_7");
        assert_eq!(event.new_rank, 1);
        assert_eq!(event.old_rank, None);
        assert_eq!(event.rank_change, 0);
        assert!(updates.try_recv().is_err());

        submit_score(&state, request(7, 100.0)).await.unwrap();
        let event = updates.try_recv().unwrap();
        assert_eq!(event.old_rank, Some(1));
        assert_eq!(event.total_score, 1000.0);
    }

    #[tokio::test]
    async fn submission_invalidates_cached_views() {
        let (state, _updates) = test_state().await;
        let ttl = Duration::from_secs(60);
        state
            .cache()
            .set(&top_leaderboard_key(10, 0), "[]".into(), ttl)
            .await;
        state
            .cache()
            .set(&user_rank_key(1), "{}".into(), ttl)
            .await;

        submit_score(&state, request(1, 100.0)).await.unwrap();

        assert!(state.cache().get(&top_leaderboard_key(10, 0)).await.is_none());
        assert!(state.cache().get(&user_rank_key(1)).await.is_none());
    }
}

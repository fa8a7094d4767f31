//! Batch reconciliation of stored ranks.
//!
//! Stored ranks are written per submission and can drift for players who
//! have not submitted recently, since another player's score moves everyone
//! below them. This job walks the active set in batches and rewrites every
//! rank from the current totals.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    cache::{TOP_LEADERBOARD_PREFIX, USER_RANK_PREFIX},
    error::ServiceError,
    services::rank,
    state::SharedState,
};

/// Recompute and persist the rank of every active player.
///
/// Each batch runs in its own transaction so a huge leaderboard never
/// holds one transaction open end to end. A failure on one player skips
/// that player and keeps the batch going; the cache is invalidated once
/// at the end. Returns the number of entries reconciled.
pub async fn reconcile_all(state: &SharedState, batch_size: i64) -> Result<u64, ServiceError> {
    let store = state.require_store().await?;
    let mut reconciled: u64 = 0;
    let mut offset: i64 = 0;

    loop {
        let mut session = store.begin().await?;
        let batch = match session.active_player_ids_by_rank(batch_size, offset).await {
            Ok(batch) => batch,
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed batch read also failed");
                }
                return Err(err.into());
            }
        };
        if batch.is_empty() {
            session.rollback().await?;
            break;
        }
        let batch_len = batch.len();

        for player_id in batch {
            let recomputed = rank::calculate_rank(session.as_mut(), player_id).await;
            let outcome = match recomputed {
                Ok(new_rank) => session.update_rank(player_id, new_rank).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => reconciled += 1,
                Err(err) => {
                    warn!(player_id, error = %err, "skipping player during reconciliation");
                }
            }
        }
        session.commit().await?;

        debug!(offset, batch_len, "reconciliation batch committed");
        offset += batch_size;
    }

    state.cache().delete_by_prefix(TOP_LEADERBOARD_PREFIX).await;
    state.cache().delete_by_prefix(USER_RANK_PREFIX).await;

    info!(reconciled, "rank reconciliation finished");
    Ok(reconciled)
}

/// Run [`reconcile_all`] on a fixed interval, for the process lifetime.
///
/// Runs are skipped while storage is degraded; the supervisor will bring
/// the store back and the next tick catches up.
pub async fn run_periodic(state: SharedState, interval: Duration, batch_size: i64) {
    info!(interval_secs = interval.as_secs(), "rank reconciliation scheduled");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; reconciling at startup would race
    // the storage supervisor's initial connection.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if state.is_degraded().await {
            debug!("skipping reconciliation while storage is degraded");
            continue;
        }
        if let Err(err) = reconcile_all(&state, batch_size).await {
            warn!(error = %err, "rank reconciliation run failed");
        }
    }
}

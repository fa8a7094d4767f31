//! Rank computation over aggregate scores.

use crate::dao::storage::{StorageResult, StorageSession};

/// Compute a player's dense rank among active entries: `1 +` the number of
/// active entries whose total score is strictly greater, so tied totals
/// share a rank.
///
/// Runs inside the caller's transaction and therefore observes its
/// uncommitted writes — the submission engine calls this right after
/// updating the player's aggregate. A player without an active entry ranks
/// `1` by convention.
pub async fn calculate_rank(
    session: &mut dyn StorageSession,
    player_id: i64,
) -> StorageResult<i64> {
    let Some(record) = session.entry_with_player(player_id).await? else {
        return Ok(1);
    };
    let higher = session
        .count_active_with_higher_score(record.total_score)
        .await?;
    Ok(higher + 1)
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::dao::{
        memory::MemoryStore,
        models::{LeaderboardEntryEntity, PlayerEntity},
        storage::LeaderboardStore,
    };

    async fn seed(session: &mut dyn StorageSession, player_id: i64, total: f64, active: bool) {
        session
            .insert_player(PlayerEntity::provisioned(player_id, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();
        session
            .upsert_entry(LeaderboardEntryEntity {
                player_id,
                total_score: total,
                games_played: 1,
                win_rate: 0.0,
                rank: 1,
                is_active: active,
                last_updated: OffsetDateTime::UNIX_EPOCH,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ranks_by_strictly_greater_totals() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        seed(session.as_mut(), 1, 1500.0, true).await;
        seed(session.as_mut(), 2, 1000.0, true).await;
        seed(session.as_mut(), 3, 800.0, true).await;

        assert_eq!(calculate_rank(session.as_mut(), 1).await.unwrap(), 1);
        assert_eq!(calculate_rank(session.as_mut(), 2).await.unwrap(), 2);
        assert_eq!(calculate_rank(session.as_mut(), 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn tied_totals_share_a_rank() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        seed(session.as_mut(), 1, 5000.0, true).await;
        seed(session.as_mut(), 2, 5000.0, true).await;
        seed(session.as_mut(), 3, 100.0, true).await;

        assert_eq!(calculate_rank(session.as_mut(), 1).await.unwrap(), 1);
        assert_eq!(calculate_rank(session.as_mut(), 2).await.unwrap(), 1);
        assert_eq!(calculate_rank(session.as_mut(), 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn inactive_entries_are_ignored() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        seed(session.as_mut(), 1, 9000.0, false).await;
        seed(session.as_mut(), 2, 100.0, true).await;

        // The inactive high scorer neither outranks others nor ranks itself.
        assert_eq!(calculate_rank(session.as_mut(), 2).await.unwrap(), 1);
        assert_eq!(calculate_rank(session.as_mut(), 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_entry_defaults_to_rank_one() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        assert_eq!(calculate_rank(session.as_mut(), 99).await.unwrap(), 1);
    }
}

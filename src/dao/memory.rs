//! In-memory storage backend.
//!
//! Used by the test suite and as the fallback backend when the crate is
//! built without `postgres-store`. A session takes the whole store's mutex
//! for its lifetime, which makes every transaction fully exclusive — the
//! equivalent, for a single-process reference backend, of the per-row lock
//! the Postgres backend takes on the write path.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::dao::{
    models::{
        GameSessionEntity, LeaderboardEntryEntity, NewGameSession, PlayerEntity, RankedEntryRecord,
    },
    storage::{LeaderboardStore, StorageResult, StorageSession},
};

#[derive(Debug, Default, Clone)]
struct MemoryData {
    players: HashMap<i64, PlayerEntity>,
    sessions: Vec<GameSessionEntity>,
    entries: HashMap<i64, LeaderboardEntryEntity>,
    next_session_id: i64,
}

/// Storage backend keeping everything in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryData>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaderboardStore for MemoryStore {
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StorageSession>>> {
        let data = self.data.clone();
        Box::pin(async move {
            let guard = data.lock_owned().await;
            let backup = guard.clone();
            Ok(Box::new(MemorySession {
                guard,
                backup: Some(backup),
            }) as Box<dyn StorageSession>)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Exclusive transaction over [`MemoryStore`].
///
/// Mutations are applied in place; the pre-transaction snapshot is restored
/// on rollback or when the session is dropped without a commit.
struct MemorySession {
    guard: OwnedMutexGuard<MemoryData>,
    backup: Option<MemoryData>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Some(backup) = self.backup.take() {
            *self.guard = backup;
        }
    }
}

#[async_trait]
impl StorageSession for MemorySession {
    async fn find_player(&mut self, id: i64) -> StorageResult<Option<PlayerEntity>> {
        Ok(self.guard.players.get(&id).cloned())
    }

    async fn insert_player(&mut self, player: PlayerEntity) -> StorageResult<()> {
        self.guard.players.entry(player.id).or_insert(player);
        Ok(())
    }

    async fn touch_player(&mut self, id: i64, at: OffsetDateTime) -> StorageResult<()> {
        if let Some(player) = self.guard.players.get_mut(&id) {
            player.last_activity = at;
        }
        Ok(())
    }

    async fn insert_game_session(&mut self, session: NewGameSession) -> StorageResult<i64> {
        self.guard.next_session_id += 1;
        let id = self.guard.next_session_id;
        self.guard.sessions.push(GameSessionEntity {
            id,
            player_id: session.player_id,
            score: session.score,
            game_mode: session.game_mode,
            duration_ms: session.duration_ms,
            metadata: session.metadata,
            created_at: session.created_at,
        });
        Ok(id)
    }

    async fn find_entry(&mut self, player_id: i64) -> StorageResult<Option<LeaderboardEntryEntity>> {
        Ok(self.guard.entries.get(&player_id).cloned())
    }

    async fn upsert_entry(&mut self, entry: LeaderboardEntryEntity) -> StorageResult<()> {
        self.guard.entries.insert(entry.player_id, entry);
        Ok(())
    }

    async fn update_rank(&mut self, player_id: i64, rank: i64) -> StorageResult<()> {
        if let Some(entry) = self.guard.entries.get_mut(&player_id) {
            entry.rank = rank;
        }
        Ok(())
    }

    async fn count_active_with_higher_score(&mut self, score: f64) -> StorageResult<i64> {
        Ok(self
            .guard
            .entries
            .values()
            .filter(|entry| entry.is_active && entry.total_score > score)
            .count() as i64)
    }

    async fn count_active(&mut self) -> StorageResult<i64> {
        Ok(self
            .guard
            .entries
            .values()
            .filter(|entry| entry.is_active)
            .count() as i64)
    }

    async fn active_entries_by_score(&mut self) -> StorageResult<Vec<RankedEntryRecord>> {
        let mut records: Vec<RankedEntryRecord> = self
            .guard
            .entries
            .values()
            .filter(|entry| entry.is_active)
            .filter_map(|entry| {
                self.guard
                    .players
                    .get(&entry.player_id)
                    .map(|player| joined_record(entry, player))
            })
            .collect();
        records.sort_by(|a, b| {
            b.total_score
                .total_cmp(&a.total_score)
                .then(a.player_id.cmp(&b.player_id))
        });
        Ok(records)
    }

    async fn entry_with_player(
        &mut self,
        player_id: i64,
    ) -> StorageResult<Option<RankedEntryRecord>> {
        let record = self
            .guard
            .entries
            .get(&player_id)
            .filter(|entry| entry.is_active)
            .and_then(|entry| {
                self.guard
                    .players
                    .get(&player_id)
                    .map(|player| joined_record(entry, player))
            });
        Ok(record)
    }

    async fn active_player_ids_by_rank(
        &mut self,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<i64>> {
        let mut entries: Vec<(i64, i64)> = self
            .guard
            .entries
            .values()
            .filter(|entry| entry.is_active)
            .map(|entry| (entry.rank, entry.player_id))
            .collect();
        entries.sort();
        Ok(entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|(_, player_id)| player_id)
            .collect())
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.backup = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        // Drop restores the pre-transaction snapshot.
        Ok(())
    }
}

fn joined_record(entry: &LeaderboardEntryEntity, player: &PlayerEntity) -> RankedEntryRecord {
    RankedEntryRecord {
        player_id: entry.player_id,
        username: player.username.clone(),
        total_score: entry.total_score,
        games_played: entry.games_played,
        win_rate: entry.win_rate,
        rank: entry.rank,
        last_updated: entry.last_updated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::GameMode;

    fn new_session(player_id: i64, score: f64) -> NewGameSession {
        NewGameSession {
            player_id,
            score,
            game_mode: GameMode::Classic,
            duration_ms: None,
            metadata: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_later_sessions() {
        let store = MemoryStore::new();

        let mut session = store.begin().await.unwrap();
        session
            .insert_player(PlayerEntity::provisioned(1, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();
        let id = session.insert_game_session(new_session(1, 100.0)).await.unwrap();
        assert_eq!(id, 1);
        session.commit().await.unwrap();

        let mut session = store.begin().await.unwrap();
        assert!(session.find_player(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dropping_a_session_discards_its_writes() {
        let store = MemoryStore::new();

        {
            let mut session = store.begin().await.unwrap();
            session
                .insert_player(PlayerEntity::provisioned(7, OffsetDateTime::UNIX_EPOCH))
                .await
                .unwrap();
            // No commit: the snapshot must win.
        }

        let mut session = store.begin().await.unwrap();
        assert!(session.find_player(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rollback_restores_previous_state() {
        let store = MemoryStore::new();

        let mut session = store.begin().await.unwrap();
        session
            .insert_player(PlayerEntity::provisioned(3, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();
        session.commit().await.unwrap();

        let mut session = store.begin().await.unwrap();
        session.touch_player(3, OffsetDateTime::now_utc()).await.unwrap();
        session.rollback().await.unwrap();

        let mut session = store.begin().await.unwrap();
        let player = session.find_player(3).await.unwrap().unwrap();
        assert_eq!(player.last_activity, OffsetDateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn uncommitted_writes_are_visible_within_the_session() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();

        session
            .upsert_entry(LeaderboardEntryEntity {
                player_id: 5,
                total_score: 900.0,
                games_played: 1,
                win_rate: 0.0,
                rank: 1,
                is_active: true,
                last_updated: OffsetDateTime::UNIX_EPOCH,
            })
            .await
            .unwrap();

        assert_eq!(session.count_active().await.unwrap(), 1);
        assert_eq!(
            session.count_active_with_higher_score(500.0).await.unwrap(),
            1
        );
        assert_eq!(
            session.count_active_with_higher_score(900.0).await.unwrap(),
            0
        );
    }
}

use std::error::Error;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;
use time::OffsetDateTime;

use crate::dao::models::{LeaderboardEntryEntity, NewGameSession, PlayerEntity, RankedEntryRecord};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Abstraction over the relational persistence layer.
///
/// A store hands out transactional [`StorageSession`]s; everything the
/// submission, query and reconciliation paths do goes through a session.
pub trait LeaderboardStore: Send + Sync {
    /// Open a new transactional session.
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StorageSession>>>;
    /// Cheap connectivity probe used by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish connectivity after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// One transaction against the storage backend.
///
/// All reads observe the session's own uncommitted writes, which the
/// submission engine relies on when recomputing a rank mid-transaction.
/// Dropping a session without calling [`commit`](Self::commit) discards its
/// writes.
#[async_trait]
pub trait StorageSession: Send {
    /// Point lookup of a player by id.
    async fn find_player(&mut self, id: i64) -> StorageResult<Option<PlayerEntity>>;
    /// Insert a player, ignoring the write when the id already exists.
    async fn insert_player(&mut self, player: PlayerEntity) -> StorageResult<()>;
    /// Refresh a player's last-activity timestamp.
    async fn touch_player(&mut self, id: i64, at: OffsetDateTime) -> StorageResult<()>;
    /// Append a game session record, returning its storage-assigned id.
    async fn insert_game_session(&mut self, session: NewGameSession) -> StorageResult<i64>;
    /// Point lookup of a leaderboard entry, locked for update within this
    /// transaction so concurrent same-player writes serialize.
    async fn find_entry(&mut self, player_id: i64) -> StorageResult<Option<LeaderboardEntryEntity>>;
    /// Insert or fully update the entry for `entry.player_id`.
    async fn upsert_entry(&mut self, entry: LeaderboardEntryEntity) -> StorageResult<()>;
    /// Persist a recomputed rank for the given player's entry.
    async fn update_rank(&mut self, player_id: i64, rank: i64) -> StorageResult<()>;
    /// Count active entries whose total score is strictly greater.
    async fn count_active_with_higher_score(&mut self, score: f64) -> StorageResult<i64>;
    /// Count all active entries.
    async fn count_active(&mut self) -> StorageResult<i64>;
    /// Full active set joined with player handles, ordered by total score
    /// descending.
    async fn active_entries_by_score(&mut self) -> StorageResult<Vec<RankedEntryRecord>>;
    /// Single active entry joined with the player handle.
    async fn entry_with_player(
        &mut self,
        player_id: i64,
    ) -> StorageResult<Option<RankedEntryRecord>>;
    /// Page of active player ids ordered by stored rank, for reconciliation.
    async fn active_player_ids_by_rank(
        &mut self,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<i64>>;
    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> StorageResult<()>;
    /// Roll the transaction back explicitly.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

//! Postgres storage backend built on sqlx.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{
    Postgres, Row, Transaction,
    postgres::{PgPool, PgPoolOptions, PgRow},
};
use time::OffsetDateTime;

use crate::dao::{
    models::{LeaderboardEntryEntity, NewGameSession, PlayerEntity, RankedEntryRecord},
    storage::{LeaderboardStore, StorageError, StorageResult, StorageSession},
};

const MAX_CONNECTIONS: u32 = 20;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tables and indexes mirroring the leaderboard schema; idempotent so the
/// backend can bootstrap an empty database.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        id BIGINT PRIMARY KEY,
        username VARCHAR(255) NOT NULL UNIQUE,
        email VARCHAR(255) NOT NULL UNIQUE,
        join_date TIMESTAMPTZ NOT NULL,
        last_activity TIMESTAMPTZ NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS game_sessions (
        id BIGSERIAL PRIMARY KEY,
        player_id BIGINT NOT NULL REFERENCES players(id) ON DELETE CASCADE,
        score DOUBLE PRECISION NOT NULL,
        game_mode TEXT NOT NULL,
        duration_ms BIGINT,
        metadata VARCHAR(512),
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS leaderboard (
        id BIGSERIAL PRIMARY KEY,
        player_id BIGINT NOT NULL UNIQUE REFERENCES players(id) ON DELETE CASCADE,
        total_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        games_played BIGINT NOT NULL DEFAULT 0,
        win_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
        \"rank\" BIGINT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        last_updated TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sessions_player_created
        ON game_sessions (player_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_leaderboard_active_score
        ON leaderboard (is_active, total_score)",
    "CREATE INDEX IF NOT EXISTS idx_leaderboard_rank ON leaderboard (\"rank\")",
];

/// Storage backend talking to Postgres through a shared connection pool.
#[derive(Clone)]
pub struct PgLeaderboardStore {
    pool: PgPool,
}

impl PgLeaderboardStore {
    /// Connect to Postgres and ensure the schema exists.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(|err| db_err("connecting to Postgres", err))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|err| db_err("creating leaderboard schema", err))?;
        }

        Ok(Self { pool })
    }

    async fn ping(pool: &PgPool) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map(|_| ())
            .map_err(|err| db_err("pinging Postgres", err))
    }
}

impl LeaderboardStore for PgLeaderboardStore {
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StorageSession>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let tx = pool
                .begin()
                .await
                .map_err(|err| db_err("opening transaction", err))?;
            Ok(Box::new(PgSession { tx }) as Box<dyn StorageSession>)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move { Self::ping(&pool).await })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        // The pool re-establishes connections on demand; a successful ping
        // means it recovered.
        let pool = self.pool.clone();
        Box::pin(async move { Self::ping(&pool).await })
    }
}

/// One Postgres transaction.
struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageSession for PgSession {
    async fn find_player(&mut self, id: i64) -> StorageResult<Option<PlayerEntity>> {
        let row = sqlx::query(
            "SELECT id, username, email, join_date, last_activity, is_active
             FROM players WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("looking up player", err))?;

        row.map(player_from_row).transpose()
    }

    async fn insert_player(&mut self, player: PlayerEntity) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO players (id, username, email, join_date, last_activity, is_active)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(player.id)
        .bind(&player.username)
        .bind(&player.email)
        .bind(player.join_date)
        .bind(player.last_activity)
        .bind(player.is_active)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("inserting player", err))?;
        Ok(())
    }

    async fn touch_player(&mut self, id: i64, at: OffsetDateTime) -> StorageResult<()> {
        sqlx::query("UPDATE players SET last_activity = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| db_err("touching player activity", err))?;
        Ok(())
    }

    async fn insert_game_session(&mut self, session: NewGameSession) -> StorageResult<i64> {
        let row = sqlx::query(
            "INSERT INTO game_sessions
                 (player_id, score, game_mode, duration_ms, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(session.player_id)
        .bind(session.score)
        .bind(session.game_mode.as_str())
        .bind(session.duration_ms)
        .bind(&session.metadata)
        .bind(session.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| db_err("inserting game session", err))?;

        row.try_get("id")
            .map_err(|err| db_err("reading session id", err))
    }

    async fn find_entry(&mut self, player_id: i64) -> StorageResult<Option<LeaderboardEntryEntity>> {
        // FOR UPDATE serializes concurrent submissions for the same player
        // while leaving other players' rows untouched.
        let row = sqlx::query(
            "SELECT player_id, total_score, games_played, win_rate, \"rank\",
                    is_active, last_updated
             FROM leaderboard WHERE player_id = $1
             FOR UPDATE",
        )
        .bind(player_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("looking up leaderboard entry", err))?;

        row.map(entry_from_row).transpose()
    }

    async fn upsert_entry(&mut self, entry: LeaderboardEntryEntity) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO leaderboard
                 (player_id, total_score, games_played, win_rate, \"rank\",
                  is_active, last_updated)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (player_id) DO UPDATE SET
                 total_score = EXCLUDED.total_score,
                 games_played = EXCLUDED.games_played,
                 win_rate = EXCLUDED.win_rate,
                 \"rank\" = EXCLUDED.\"rank\",
                 is_active = EXCLUDED.is_active,
                 last_updated = EXCLUDED.last_updated",
        )
        .bind(entry.player_id)
        .bind(entry.total_score)
        .bind(entry.games_played)
        .bind(entry.win_rate)
        .bind(entry.rank)
        .bind(entry.is_active)
        .bind(entry.last_updated)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("upserting leaderboard entry", err))?;
        Ok(())
    }

    async fn update_rank(&mut self, player_id: i64, rank: i64) -> StorageResult<()> {
        sqlx::query("UPDATE leaderboard SET \"rank\" = $2 WHERE player_id = $1")
            .bind(player_id)
            .bind(rank)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| db_err("updating rank", err))?;
        Ok(())
    }

    async fn count_active_with_higher_score(&mut self, score: f64) -> StorageResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM leaderboard
             WHERE is_active AND total_score > $1",
        )
        .bind(score)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| db_err("counting higher scores", err))?;

        row.try_get("n").map_err(|err| db_err("reading count", err))
    }

    async fn count_active(&mut self) -> StorageResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM leaderboard WHERE is_active")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|err| db_err("counting active entries", err))?;

        row.try_get("n").map_err(|err| db_err("reading count", err))
    }

    async fn active_entries_by_score(&mut self) -> StorageResult<Vec<RankedEntryRecord>> {
        let rows = sqlx::query(
            "SELECT l.player_id, p.username, l.total_score, l.games_played,
                    l.win_rate, l.\"rank\", l.last_updated
             FROM leaderboard l
             JOIN players p ON p.id = l.player_id
             WHERE l.is_active
             ORDER BY l.total_score DESC, l.player_id ASC",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("listing leaderboard", err))?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn entry_with_player(
        &mut self,
        player_id: i64,
    ) -> StorageResult<Option<RankedEntryRecord>> {
        let row = sqlx::query(
            "SELECT l.player_id, p.username, l.total_score, l.games_played,
                    l.win_rate, l.\"rank\", l.last_updated
             FROM leaderboard l
             JOIN players p ON p.id = l.player_id
             WHERE l.player_id = $1 AND l.is_active",
        )
        .bind(player_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("looking up ranked entry", err))?;

        row.map(record_from_row).transpose()
    }

    async fn active_player_ids_by_rank(
        &mut self,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT player_id FROM leaderboard
             WHERE is_active
             ORDER BY \"rank\" ASC, player_id ASC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("paging entries by rank", err))?;

        rows.into_iter()
            .map(|row| {
                row.try_get("player_id")
                    .map_err(|err| db_err("reading player id", err))
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|err| db_err("committing transaction", err))
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|err| db_err("rolling back transaction", err))
    }
}

fn player_from_row(row: PgRow) -> StorageResult<PlayerEntity> {
    let read = |err| db_err("decoding player row", err);
    Ok(PlayerEntity {
        id: row.try_get("id").map_err(read)?,
        username: row.try_get("username").map_err(read)?,
        email: row.try_get("email").map_err(read)?,
        join_date: row.try_get("join_date").map_err(read)?,
        last_activity: row.try_get("last_activity").map_err(read)?,
        is_active: row.try_get("is_active").map_err(read)?,
    })
}

fn entry_from_row(row: PgRow) -> StorageResult<LeaderboardEntryEntity> {
    let read = |err| db_err("decoding leaderboard row", err);
    Ok(LeaderboardEntryEntity {
        player_id: row.try_get("player_id").map_err(read)?,
        total_score: row.try_get("total_score").map_err(read)?,
        games_played: row.try_get("games_played").map_err(read)?,
        win_rate: row.try_get("win_rate").map_err(read)?,
        rank: row.try_get("rank").map_err(read)?,
        is_active: row.try_get("is_active").map_err(read)?,
        last_updated: row.try_get("last_updated").map_err(read)?,
    })
}

fn record_from_row(row: PgRow) -> StorageResult<RankedEntryRecord> {
    let read = |err| db_err("decoding ranked entry row", err);
    Ok(RankedEntryRecord {
        player_id: row.try_get("player_id").map_err(read)?,
        username: row.try_get("username").map_err(read)?,
        total_score: row.try_get("total_score").map_err(read)?,
        games_played: row.try_get("games_played").map_err(read)?,
        win_rate: row.try_get("win_rate").map_err(read)?,
        rank: row.try_get("rank").map_err(read)?,
        last_updated: row.try_get("last_updated").map_err(read)?,
    })
}

fn db_err(message: &str, source: sqlx::Error) -> StorageError {
    StorageError::unavailable(message.to_string(), source)
}

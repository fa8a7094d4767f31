use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Fixed set of game modes a session can be played in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Default free-play mode.
    Classic,
    /// Competitive matchmaking.
    Ranked,
    /// Bracketed tournament play.
    Tournament,
    /// Endless survival runs.
    Survival,
}

impl GameMode {
    /// Stable lowercase name used for SQL storage and wire payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Classic => "classic",
            GameMode::Ranked => "ranked",
            GameMode::Tournament => "tournament",
            GameMode::Survival => "survival",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "classic" => Ok(GameMode::Classic),
            "ranked" => Ok(GameMode::Ranked),
            "tournament" => Ok(GameMode::Tournament),
            "survival" => Ok(GameMode::Survival),
            other => Err(format!("unknown game mode `{other}`")),
        }
    }
}

/// Player identity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerEntity {
    /// Stable numeric identifier supplied by the game client.
    pub id: i64,
    /// Unique display handle.
    pub username: String,
    /// Unique contact identifier.
    pub email: String,
    /// When the player first appeared.
    pub join_date: OffsetDateTime,
    /// Last time the player submitted a score.
    pub last_activity: OffsetDateTime,
    /// Inactive players are excluded from ranking.
    pub is_active: bool,
}

impl PlayerEntity {
    /// Build the auto-provisioned identity used when a score arrives for an
    /// unknown player id.
    pub fn provisioned(id: i64, now: OffsetDateTime) -> Self {
        Self {
            id,
            username: format!("Player_{id}"),
            email: format!("player{id}@leaderboard.local"),
            join_date: now,
            last_activity: now,
            is_active: true,
        }
    }
}

/// Append-only record of a single played game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSessionEntity {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Player who played the session.
    pub player_id: i64,
    /// Raw score achieved in this session.
    pub score: f64,
    /// Mode the session was played in.
    pub game_mode: GameMode,
    /// Optional session duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Optional free-form metadata serialized by the client.
    pub metadata: Option<String>,
    /// When the session record was written.
    pub created_at: OffsetDateTime,
}

/// Fields of a game session known before storage assigns an id.
#[derive(Debug, Clone)]
pub struct NewGameSession {
    /// Player who played the session.
    pub player_id: i64,
    /// Raw score achieved in this session.
    pub score: f64,
    /// Mode the session was played in.
    pub game_mode: GameMode,
    /// Optional session duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Optional free-form metadata serialized by the client.
    pub metadata: Option<String>,
    /// When the session record was written.
    pub created_at: OffsetDateTime,
}

/// Denormalized per-player aggregate used for ranking queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntryEntity {
    /// Player this aggregate belongs to (unique).
    pub player_id: i64,
    /// Sum of all of the player's session scores.
    pub total_score: f64,
    /// Number of sessions submitted so far.
    pub games_played: i64,
    /// Derived win rate; no win signal exists in submissions yet, so this
    /// stays at its stored value.
    pub win_rate: f64,
    /// Current dense rank (1 = highest total score, ties share a rank).
    pub rank: i64,
    /// Inactive entries are excluded from ranking and percentile math.
    pub is_active: bool,
    /// Last mutation timestamp.
    pub last_updated: OffsetDateTime,
}

/// Read model joining a leaderboard entry with its player's handle.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntryRecord {
    /// Player the entry belongs to.
    pub player_id: i64,
    /// Player display handle.
    pub username: String,
    /// Cumulative score.
    pub total_score: f64,
    /// Number of sessions submitted.
    pub games_played: i64,
    /// Derived win rate.
    pub win_rate: f64,
    /// Stored dense rank.
    pub rank: i64,
    /// Last mutation timestamp.
    pub last_updated: OffsetDateTime,
}

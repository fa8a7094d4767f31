use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dao::models::{GameMode, RankedEntryRecord};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
/// Score submission payload.
pub struct ScoreSubmitRequest {
    /// Positive player identifier; unknown ids are auto-provisioned.
    #[validate(range(min = 1, message = "player_id must be positive"))]
    pub player_id: i64,
    /// Score achieved in this game; must be strictly positive.
    #[validate(range(exclusive_min = 0.0, message = "score must be positive"))]
    pub score: f64,
    /// Mode the game was played in.
    #[serde(default = "default_game_mode")]
    pub game_mode: GameMode,
    /// Optional game duration in milliseconds.
    #[validate(range(min = 0, message = "duration_ms must not be negative"))]
    pub duration_ms: Option<i64>,
    /// Optional free-form game data, stored verbatim.
    pub metadata: Option<serde_json::Value>,
}

fn default_game_mode() -> GameMode {
    GameMode::Classic
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Result of a successful score submission.
pub struct ScoreSubmitResponse {
    /// Identifier of the recorded game session.
    pub session_id: i64,
    /// Player the score was recorded for.
    pub player_id: i64,
    /// Score submitted in this call.
    pub score: f64,
    /// Cumulative total after this submission.
    pub new_total_score: f64,
    /// Dense rank after this submission.
    pub new_rank: i64,
    /// `old_rank - new_rank`; positive when the rank improved, `0` on a
    /// player's first submission.
    pub rank_change: i64,
    /// Human-readable confirmation.
    pub message: String,
}

impl ScoreSubmitResponse {
    /// Format the confirmation message with the rank movement arrow.
    pub fn message_for(new_rank: i64, rank_change: i64) -> String {
        let movement = match rank_change {
            delta if delta > 0 => format!(" (\u{2191}{delta})"),
            delta if delta < 0 => format!(" (\u{2193}{})", delta.abs()),
            _ => String::new(),
        };
        format!("Score submitted! New rank: {new_rank}{movement}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
/// A single listed leaderboard entry.
pub struct LeaderboardEntry {
    /// Dense rank; tied totals share the same value.
    pub rank: i64,
    /// Player identifier.
    pub player_id: i64,
    /// Player handle.
    pub username: String,
    /// Cumulative score.
    pub total_score: f64,
    /// Number of sessions submitted.
    pub games_played: i64,
    /// Derived win rate.
    pub win_rate: f64,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl LeaderboardEntry {
    /// Build a listed entry from a storage record and its display rank.
    pub fn from_record(rank: i64, record: &RankedEntryRecord) -> Self {
        Self {
            rank,
            player_id: record.player_id,
            username: record.username.clone(),
            total_score: record.total_score,
            games_played: record.games_played,
            win_rate: record.win_rate,
            last_updated: record.last_updated,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Page of leaderboard entries.
pub struct LeaderboardTopResponse {
    /// Entries in descending score order.
    pub entries: Vec<LeaderboardEntry>,
    /// Number of entries in this page.
    pub total_entries: usize,
    /// When the page was produced.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
/// Detailed rank view for one player.
pub struct UserRankResponse {
    /// Player identifier.
    pub player_id: i64,
    /// Player handle.
    pub username: String,
    /// Stored dense rank.
    pub rank: i64,
    /// Cumulative score.
    pub total_score: f64,
    /// Number of sessions submitted.
    pub games_played: i64,
    /// Derived win rate.
    pub win_rate: f64,
    /// Share of active players this player outranks, 0-100.
    pub percentile: f64,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
/// Query parameters accepted by the top-N endpoint.
pub struct TopQuery {
    /// Page size, 1 to 1000; defaults to the configured top-N.
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<usize>,
    /// Number of leading entries to skip.
    pub offset: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(player_id: i64, score: f64) -> ScoreSubmitRequest {
        ScoreSubmitRequest {
            player_id,
            score,
            game_mode: GameMode::Classic,
            duration_ms: None,
            metadata: None,
        }
    }

    #[test]
    fn accepts_positive_score_and_id() {
        assert!(request(1, 100.0).validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_score() {
        assert!(request(1, 0.0).validate().is_err());
        assert!(request(1, -5.0).validate().is_err());
    }

    #[test]
    fn rejects_non_positive_player_id() {
        assert!(request(0, 100.0).validate().is_err());
        assert!(request(-3, 100.0).validate().is_err());
    }

    #[test]
    fn rejects_negative_duration() {
        let mut req = request(1, 100.0);
        req.duration_ms = Some(-1);
        assert!(req.validate().is_err());
        req.duration_ms = Some(0);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn game_mode_defaults_to_classic() {
        let req: ScoreSubmitRequest =
            serde_json::from_str(r#"{"player_id": 1, "score": 10.0}"#).unwrap();
        assert_eq!(req.game_mode, GameMode::Classic);
    }

    #[test]
    fn unknown_game_mode_is_rejected_at_parse_time() {
        let parsed: Result<ScoreSubmitRequest, _> =
            serde_json::from_str(r#"{"player_id": 1, "score": 10.0, "game_mode": "speedrun"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn message_reflects_rank_movement() {
        assert_eq!(
            ScoreSubmitResponse::message_for(3, 2),
            "Score submitted! New rank: 3 (\u{2191}2)"
        );
        assert_eq!(
            ScoreSubmitResponse::message_for(5, -2),
            "Score submitted! New rank: 5 (\u{2193}2)"
        );
        assert_eq!(
            ScoreSubmitResponse::message_for(1, 0),
            "Score submitted! New rank: 1"
        );
    }
}

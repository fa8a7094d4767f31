use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::dto::leaderboard::LeaderboardEntry;

/// `event_type` value carried by rank change messages.
pub const EVENT_LEADERBOARD_UPDATE: &str = "leaderboard_update";
/// `event_type` value carried by full listing messages.
pub const EVENT_LEADERBOARD_SNAPSHOT: &str = "leaderboard_snapshot";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// One rank change, produced per successful submission and fanned out to
/// every connected viewer.
pub struct LeaderboardUpdateEvent {
    /// Always [`EVENT_LEADERBOARD_UPDATE`].
    pub event_type: String,
    /// Player whose rank changed.
    pub player_id: i64,
    /// Player handle.
    pub username: String,
    /// Rank after the submission.
    pub new_rank: i64,
    /// Rank before the submission; `null` on a player's first entry.
    pub old_rank: Option<i64>,
    /// Cumulative total after the submission.
    pub total_score: f64,
    /// `old_rank - new_rank`; positive when the rank improved.
    pub rank_change: i64,
    /// When the submission committed.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LeaderboardUpdateEvent {
    /// Assemble an update event with the fixed event type tag.
    pub fn new(
        player_id: i64,
        username: String,
        new_rank: i64,
        old_rank: Option<i64>,
        total_score: f64,
        rank_change: i64,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            event_type: EVENT_LEADERBOARD_UPDATE.to_string(),
            player_id,
            username,
            new_rank,
            old_rank,
            total_score,
            rank_change,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// Full top-N listing sent once to each newly registered connection so new
/// viewers start from a consistent baseline.
pub struct LeaderboardSnapshotEvent {
    /// Always [`EVENT_LEADERBOARD_SNAPSHOT`].
    pub event_type: String,
    /// Current top entries in display order.
    pub entries: Vec<LeaderboardEntry>,
    /// When the snapshot was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LeaderboardSnapshotEvent {
    /// Assemble a snapshot event with the fixed event type tag.
    pub fn new(entries: Vec<LeaderboardEntry>, timestamp: OffsetDateTime) -> Self {
        Self {
            event_type: EVENT_LEADERBOARD_SNAPSHOT.to_string(),
            entries,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_event_serializes_stable_field_names() {
        let event = LeaderboardUpdateEvent::new(
            7,
            "Player_7".into(),
            2,
            None,
            1500.0,
            0,
            OffsetDateTime::UNIX_EPOCH,
        );
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "leaderboard_update");
        assert_eq!(value["player_id"], 7);
        assert_eq!(value["old_rank"], serde_json::Value::Null);
        assert_eq!(value["new_rank"], 2);
        assert_eq!(value["timestamp"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn snapshot_event_carries_the_type_tag() {
        let event = LeaderboardSnapshotEvent::new(Vec::new(), OffsetDateTime::UNIX_EPOCH);
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "leaderboard_snapshot");
        assert!(value["entries"].as_array().unwrap().is_empty());
    }
}

//! Fan-out of leaderboard events to connected viewers.

use axum::extract::ws::Message;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    dto::{
        leaderboard::LeaderboardEntry,
        ws::{LeaderboardSnapshotEvent, LeaderboardUpdateEvent},
    },
    state::SharedState,
};

/// Failure to hand a message to one viewer's writer task.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The event could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    /// The connection's writer channel is gone.
    #[error("viewer connection closed")]
    ConnectionClosed,
}

/// Consume the submission-side event queue and fan each event out.
///
/// Runs for the lifetime of the process; exits only when every submission
/// handle has been dropped.
pub async fn run(state: SharedState, mut updates: mpsc::UnboundedReceiver<LeaderboardUpdateEvent>) {
    info!("leaderboard broadcaster started");
    while let Some(event) = updates.recv().await {
        broadcast_update(&state, &event).await;
    }
    info!("leaderboard broadcaster stopped");
}

/// Deliver one update to every registered viewer.
///
/// The event is serialized once and sent to a snapshot of the registry, so
/// slow or dead connections never hold registry locks. Connections whose
/// writer task has gone away are unregistered after the pass.
pub async fn broadcast_update(state: &SharedState, event: &LeaderboardUpdateEvent) {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "dropping unencodable leaderboard update");
            return;
        }
    };

    let connections = state.viewers().snapshot();
    let mut stale = Vec::new();
    for (player_id, connection_id, tx) in &connections {
        if tx.send(Message::Text(payload.clone().into())).is_err() {
            stale.push((*player_id, *connection_id));
        }
    }
    for (player_id, connection_id) in &stale {
        state.viewers().unregister(*player_id, *connection_id);
    }

    debug!(
        player_id = event.player_id,
        delivered = connections.len() - stale.len(),
        pruned = stale.len(),
        "leaderboard update fanned out"
    );
}

/// Send the initial full listing to one freshly registered viewer.
pub fn send_snapshot(
    tx: &mpsc::UnboundedSender<Message>,
    entries: Vec<LeaderboardEntry>,
    timestamp: OffsetDateTime,
) -> Result<(), DeliveryError> {
    let event = LeaderboardSnapshotEvent::new(entries, timestamp);
    let payload = serde_json::to_string(&event)?;
    tx.send(Message::Text(payload.into()))
        .map_err(|_| DeliveryError::ConnectionClosed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        cache::memory::MemoryCache, config::AppConfig, state::viewers::ViewerConnection,
        state::AppState,
    };

    fn update_event(player_id: i64) -> LeaderboardUpdateEvent {
        LeaderboardUpdateEvent::new(
            player_id,
            format!("Player_{player_id}"),
            1,
            Some(2),
            900.0,
            1,
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    fn text_payload(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_reaches_every_registered_viewer() {
        let (state, _updates) = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        state.viewers().register(1, &ViewerConnection::new(tx_a));
        state.viewers().register(2, &ViewerConnection::new(tx_b));

        broadcast_update(&state, &update_event(7)).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let payload = text_payload(rx.try_recv().unwrap());
            let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
            assert_eq!(value["event_type"], "leaderboard_update");
            assert_eq!(value["player_id"], 7);
        }
    }

    #[tokio::test]
    async fn dead_connections_are_pruned_during_fan_out() {
        let (state, _updates) = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        state.viewers().register(1, &ViewerConnection::new(tx_live));
        state.viewers().register(2, &ViewerConnection::new(tx_dead));
        drop(rx_dead);

        broadcast_update(&state, &update_event(3)).await;

        assert_eq!(state.viewers().connection_count(), 1);
        assert!(rx_live.try_recv().is_ok());
    }

    #[tokio::test]
    async fn queued_events_are_drained_in_order() {
        let (state, updates) = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.viewers().register(1, &ViewerConnection::new(tx));

        state.publish_update(update_event(1));
        state.publish_update(update_event(2));
        let broadcaster = tokio::spawn(run(Arc::clone(&state), updates));

        let first = text_payload(rx.recv().await.unwrap());
        let second = text_payload(rx.recv().await.unwrap());
        let first: serde_json::Value = serde_json::from_str(&first).unwrap();
        let second: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(first["player_id"], 1);
        assert_eq!(second["player_id"], 2);

        broadcaster.abort();
    }

    #[tokio::test]
    async fn new_viewer_sees_the_snapshot_before_any_update() {
        let (state, _updates) = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = ViewerConnection::new(tx.clone());
        state.viewers().register(9, &connection);
        send_snapshot(&tx, Vec::new(), OffsetDateTime::UNIX_EPOCH).unwrap();

        broadcast_update(&state, &update_event(1)).await;

        let first: serde_json::Value =
            serde_json::from_str(&text_payload(rx.try_recv().unwrap())).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&text_payload(rx.try_recv().unwrap())).unwrap();
        assert_eq!(first["event_type"], "leaderboard_snapshot");
        assert_eq!(second["event_type"], "leaderboard_update");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn snapshot_send_fails_once_the_viewer_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        send_snapshot(&tx, Vec::new(), OffsetDateTime::UNIX_EPOCH).unwrap();
        drop(rx);
        let err = send_snapshot(&tx, Vec::new(), OffsetDateTime::UNIX_EPOCH).unwrap_err();
        assert!(matches!(err, DeliveryError::ConnectionClosed));
    }
}

use std::collections::HashMap;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Handle used to push messages to one connected viewer.
#[derive(Clone)]
pub struct ViewerConnection {
    /// Unique identifier of this connection (one player may hold several).
    pub id: Uuid,
    /// Writer channel feeding the connection's send task.
    pub tx: mpsc::UnboundedSender<Message>,
}

impl ViewerConnection {
    /// Pair a fresh connection id with its writer channel.
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }
}

/// Registry of live viewer connections keyed by viewing player id.
///
/// Registration, unregistration and broadcast iterate concurrently; the
/// sharded map keeps them from serializing against each other. Fan-out
/// works on a snapshot so sends never happen under shard locks.
#[derive(Default)]
pub struct ViewerRegistry {
    connections: DashMap<i64, HashMap<Uuid, mpsc::UnboundedSender<Message>>>,
}

impl ViewerRegistry {
    /// Add a connection under `player_id`. Re-registering the same
    /// connection id is a no-op beyond refreshing its sender.
    pub fn register(&self, player_id: i64, connection: &ViewerConnection) {
        self.connections
            .entry(player_id)
            .or_default()
            .insert(connection.id, connection.tx.clone());
    }

    /// Remove a connection; drops the player's registry slot when it was
    /// the last one.
    pub fn unregister(&self, player_id: i64, connection_id: Uuid) {
        let Some(mut senders) = self.connections.get_mut(&player_id) else {
            return;
        };
        senders.remove(&connection_id);
        let emptied = senders.is_empty();
        drop(senders);
        if emptied {
            self.connections
                .remove_if(&player_id, |_, senders| senders.is_empty());
        }
    }

    /// Total number of live connections across all players.
    pub fn connection_count(&self) -> usize {
        self.connections
            .iter()
            .map(|senders| senders.len())
            .sum()
    }

    /// Snapshot every registered connection for lock-free fan-out.
    pub fn snapshot(&self) -> Vec<(i64, Uuid, mpsc::UnboundedSender<Message>)> {
        self.connections
            .iter()
            .flat_map(|entry| {
                let player_id = *entry.key();
                entry
                    .value()
                    .iter()
                    .map(|(id, tx)| (player_id, *id, tx.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dto::ws::ServerEvent;

/// Transient transport identity, one per WebSocket.
pub type ConnectionId = Uuid;

/// Queue drained by a connection's writer task.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Association between a live connection and a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Lobby the connection joined.
    pub lobby_id: String,
    /// Participant the connection speaks for.
    pub player_id: String,
}

/// Registry of live connections, their outbound queues and their lobby bindings.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    outboxes: DashMap<ConnectionId, Outbox>,
    bindings: DashMap<ConnectionId, Binding>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly accepted connection.
    pub fn register(&self, connection_id: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(connection_id, outbox);
    }

    /// Forget a closed connection, returning the binding it still held.
    pub fn deregister(&self, connection_id: ConnectionId) -> Option<Binding> {
        self.outboxes.remove(&connection_id);
        self.unbind(connection_id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }

    /// Bind a connection to a participant. Last bind wins: other connections
    /// bound to the same participant are unbound and returned.
    pub fn bind(
        &self,
        connection_id: ConnectionId,
        lobby_id: &str,
        player_id: &str,
    ) -> Vec<ConnectionId> {
        let displaced: Vec<ConnectionId> = self
            .bindings
            .iter()
            .filter(|entry| {
                *entry.key() != connection_id
                    && entry.lobby_id == lobby_id
                    && entry.player_id == player_id
            })
            .map(|entry| *entry.key())
            .collect();

        for stale in &displaced {
            self.bindings.remove(stale);
            debug!(connection_id = %stale, lobby_id, player_id, "binding displaced by newer connection");
        }

        self.bindings.insert(
            connection_id,
            Binding {
                lobby_id: lobby_id.to_owned(),
                player_id: player_id.to_owned(),
            },
        );
        displaced
    }

    /// Drop the binding of a connection, keeping the connection itself.
    pub fn unbind(&self, connection_id: ConnectionId) -> Option<Binding> {
        self.bindings
            .remove(&connection_id)
            .map(|(_, binding)| binding)
    }

    /// Look up which participant a connection speaks for.
    pub fn resolve(&self, connection_id: ConnectionId) -> Option<Binding> {
        self.bindings
            .get(&connection_id)
            .map(|entry| entry.value().clone())
    }

    /// Connections currently bound to `lobby_id`.
    pub fn connections_in_lobby(&self, lobby_id: &str) -> Vec<ConnectionId> {
        self.bindings
            .iter()
            .filter(|entry| entry.lobby_id == lobby_id)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Queue an event for one connection. Returns false when it is gone.
    pub fn send(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let Some(outbox) = self
            .outboxes
            .get(&connection_id)
            .map(|entry| entry.value().clone())
        else {
            debug!(%connection_id, event = event.name(), "dropping event for unknown connection");
            return false;
        };

        if outbox.send(event).is_err() {
            warn!(%connection_id, "outbound queue closed; dropping connection");
            self.outboxes.remove(&connection_id);
            return false;
        }
        true
    }

    /// Queue an event for every connection bound to `lobby_id`, returning how many got it.
    pub fn broadcast(&self, lobby_id: &str, event: &ServerEvent) -> usize {
        self.connections_in_lobby(lobby_id)
            .into_iter()
            .filter(|connection_id| self.send(*connection_id, event.clone()))
            .count()
    }
}

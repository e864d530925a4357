use std::collections::HashSet;

use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::dto::ws::ServerMessage;

/// Identifier of one realtime connection.
pub type ConnectionId = Uuid;

#[derive(Clone, Debug)]
/// Handle used to push events to a connected client.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: Uuid,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(user_id: Uuid, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            tx,
        }
    }
}

/// Session-scoped subscriber groups for realtime fan-out.
///
/// Connections whose writer has gone away are pruned on the next delivery attempt.
#[derive(Default)]
pub struct BroadcastGateway {
    groups: DashMap<Uuid, IndexMap<ConnectionId, ConnectionHandle>>,
    memberships: DashMap<ConnectionId, HashSet<Uuid>>,
}

impl BroadcastGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the connection to the session group. Subscribing twice is a no-op.
    pub fn subscribe(&self, session_id: Uuid, connection: ConnectionHandle) {
        let connection_id = connection.id;
        self.groups
            .entry(session_id)
            .or_default()
            .insert(connection_id, connection);
        self.memberships
            .entry(connection_id)
            .or_default()
            .insert(session_id);
    }

    /// Remove the connection from the session group, returning whether it was subscribed.
    pub fn unsubscribe(&self, session_id: Uuid, connection_id: ConnectionId) -> bool {
        let removed = self.remove_from_group(session_id, connection_id);
        if let Some(mut sessions) = self.memberships.get_mut(&connection_id) {
            sessions.remove(&session_id);
        }
        self.memberships
            .remove_if(&connection_id, |_, sessions| sessions.is_empty());
        removed
    }

    /// Drop the connection from every group, returning the `(session, user)` pairs it left.
    pub fn disconnect(&self, connection_id: ConnectionId) -> Vec<(Uuid, Uuid)> {
        let Some((_, sessions)) = self.memberships.remove(&connection_id) else {
            return Vec::new();
        };

        sessions
            .into_iter()
            .filter_map(|session_id| {
                let user_id = self
                    .groups
                    .get(&session_id)
                    .and_then(|group| group.get(&connection_id).map(|c| c.user_id));
                self.remove_from_group(session_id, connection_id);
                user_id.map(|user_id| (session_id, user_id))
            })
            .collect()
    }

    /// Forget a whole group, used once the session itself is deleted.
    pub fn close_session(&self, session_id: Uuid) {
        let Some((_, group)) = self.groups.remove(&session_id) else {
            return;
        };
        for connection_id in group.keys() {
            if let Some(mut sessions) = self.memberships.get_mut(connection_id) {
                sessions.remove(&session_id);
            }
        }
    }

    /// Send an event to every connection of the group, returning how many accepted it.
    pub fn publish(&self, session_id: Uuid, message: &ServerMessage) -> usize {
        self.deliver(session_id, message, |_| true)
    }

    /// Send an event to the group except connections owned by `user_id`.
    pub fn publish_except_user(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        message: &ServerMessage,
    ) -> usize {
        self.deliver(session_id, message, |connection| {
            connection.user_id != user_id
        })
    }

    /// Send an event to the group except one connection.
    pub fn publish_except_connection(
        &self,
        session_id: Uuid,
        connection_id: ConnectionId,
        message: &ServerMessage,
    ) -> usize {
        self.deliver(session_id, message, |connection| connection.id != connection_id)
    }

    /// Send an event to a single connection.
    pub fn send_to(&self, connection: &ConnectionHandle, message: ServerMessage) -> bool {
        connection.tx.send(message).is_ok()
    }

    /// Number of connections subscribed to the session.
    pub fn subscriber_count(&self, session_id: Uuid) -> usize {
        self.groups
            .get(&session_id)
            .map(|group| group.len())
            .unwrap_or(0)
    }

    fn deliver(
        &self,
        session_id: Uuid,
        message: &ServerMessage,
        include: impl Fn(&ConnectionHandle) -> bool,
    ) -> usize {
        let targets: Vec<ConnectionHandle> = match self.groups.get(&session_id) {
            Some(group) => group
                .values()
                .filter(|connection| include(connection))
                .cloned()
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for connection in targets {
            if connection.tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(
                    session_id = %session_id,
                    connection_id = %connection.id,
                    "pruning closed connection"
                );
                self.unsubscribe(session_id, connection.id);
            }
        }
        delivered
    }

    fn remove_from_group(&self, session_id: Uuid, connection_id: ConnectionId) -> bool {
        let removed = self
            .groups
            .get_mut(&session_id)
            .map(|mut group| group.shift_remove(&connection_id).is_some())
            .unwrap_or(false);
        self.groups.remove_if(&session_id, |_, group| group.is_empty());
        removed
    }
}

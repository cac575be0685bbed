//! In-process realtime hub.
//!
//! Each online user owns one broadcast channel shared by all of their
//! sockets. The connection count doubles as the presence map: a user is
//! online while the count is above zero.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::routes::models::{MessageResponse, NotificationResponse};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Hello {
        user_id: String,
    },
    Pong,
    Notification {
        notification: NotificationResponse,
    },
    MessageCreated {
        conversation_id: String,
        message: MessageResponse,
    },
    ConversationRead {
        conversation_id: String,
        reader_id: String,
        read_at: String,
    },
    Typing {
        conversation_id: String,
        user_id: String,
    },
    Presence {
        user_id: String,
        online: bool,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Ping,
    Typing { conversation_id: String },
    MarkRead { conversation_id: String },
}

struct UserChannel {
    sender: broadcast::Sender<ServerEvent>,
    connections: usize,
}

#[derive(Clone, Default)]
pub struct RealtimeHub {
    users: Arc<Mutex<HashMap<i64, UserChannel>>>,
}

/// Result of registering a socket with the hub.
pub struct Subscription {
    pub receiver: broadcast::Receiver<ServerEvent>,
    /// True when this socket brought the user online.
    pub came_online: bool,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> MutexGuard<'_, HashMap<i64, UserChannel>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connect(&self, user_id: i64) -> Subscription {
        let mut users = self.users();
        let channel = users.entry(user_id).or_insert_with(|| UserChannel {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            connections: 0,
        });
        channel.connections += 1;
        debug!(user_id, connections = channel.connections, "socket connected");

        Subscription {
            receiver: channel.sender.subscribe(),
            came_online: channel.connections == 1,
        }
    }

    /// Returns true when the last socket of the user went away.
    pub fn disconnect(&self, user_id: i64) -> bool {
        let mut users = self.users();
        let Some(channel) = users.get_mut(&user_id) else {
            return false;
        };

        channel.connections = channel.connections.saturating_sub(1);
        debug!(user_id, connections = channel.connections, "socket disconnected");
        if channel.connections == 0 {
            users.remove(&user_id);
            true
        } else {
            false
        }
    }

    /// Drop every socket of the user. Receivers observe a closed channel.
    pub fn disconnect_user(&self, user_id: i64) -> bool {
        self.users().remove(&user_id).is_some()
    }

    /// Push to every live socket of the user; returns how many received it.
    pub fn send_to_user(&self, user_id: i64, event: ServerEvent) -> usize {
        match self.users().get(&user_id) {
            Some(channel) => channel.sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_online(&self, user_id: i64) -> bool {
        self.users()
            .get(&user_id)
            .is_some_and(|channel| channel.connections > 0)
    }

    #[cfg(test)]
    pub(crate) fn connection_count(&self, user_id: i64) -> usize {
        self.users()
            .get(&user_id)
            .map(|channel| channel.connections)
            .unwrap_or(0)
    }

    pub fn online_among(&self, user_ids: &[i64]) -> Vec<i64> {
        let users = self.users();
        user_ids
            .iter()
            .copied()
            .filter(|id| users.get(id).is_some_and(|channel| channel.connections > 0))
            .collect()
    }
}

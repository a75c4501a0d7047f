//! Push events and their fan-out
//!
//! [`EventListener`] reads the server's notification stream on its own
//! connection and hands parsed [`Event`]s to a [`SubscriptionRegistry`].

mod listener;
mod registry;

pub use listener::{
    EventListener, ListenerSettings, ListenerState, StatusSource, DEFAULT_LISTEN_COMMAND,
};
pub use registry::{EventHandler, SubscriptionId, SubscriptionRegistry};

use serde::{Deserialize, Serialize};

use crate::model::PlayerStatus;

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    PlaylistChanged {
        player_id: String,
        status: PlayerStatus,
    },
    SongChanged {
        player_id: String,
        status: PlayerStatus,
    },
    TimeChanged {
        player_id: String,
        seconds: f64,
    },
    /// Push stream closed or failed. Not scoped to a player.
    Disconnected,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PlaylistChanged { .. } => EventKind::PlaylistChanged,
            Self::SongChanged { .. } => EventKind::SongChanged,
            Self::TimeChanged { .. } => EventKind::TimeChanged,
            Self::Disconnected => EventKind::Disconnected,
        }
    }

    pub fn player_id(&self) -> Option<&str> {
        match self {
            Self::PlaylistChanged { player_id, .. }
            | Self::SongChanged { player_id, .. }
            | Self::TimeChanged { player_id, .. } => Some(player_id),
            Self::Disconnected => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PlaylistChanged,
    SongChanged,
    TimeChanged,
    Disconnected,
}

/// Which players a subscription covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlayerScope {
    All,
    Player(String),
}

impl PlayerScope {
    pub fn player(id: impl Into<String>) -> Self {
        Self::Player(id.into())
    }
}

impl From<Option<&str>> for PlayerScope {
    fn from(id: Option<&str>) -> Self {
        match id {
            Some(id) => Self::Player(id.to_string()),
            None => Self::All,
        }
    }
}

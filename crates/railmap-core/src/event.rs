use serde::{Deserialize, Serialize};

use crate::train::{ServerEntity, TrainEntity, TrainId, TrainPosition};

/// State of the push channel, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// Connection lost; the transport is retrying.
    Reconnecting { attempt: u32 },
    /// Not connected and not retrying.
    Disconnected { reason: Option<String> },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// An inbound event from the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    ServersReceived(Vec<ServerEntity>),
    /// Authoritative full snapshot of train metadata.
    TrainsReceived(Vec<TrainEntity>),
    /// Authoritative full snapshot of active positions.
    TrainPositionsReceived(Vec<TrainPosition>),
    StatusChanged(ConnectionStatus),
}

impl ChannelEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelEvent::ServersReceived(_) => "ServersReceived",
            ChannelEvent::TrainsReceived(_) => "TrainsReceived",
            ChannelEvent::TrainPositionsReceived(_) => "TrainPositionsReceived",
            ChannelEvent::StatusChanged(_) => "StatusChanged",
        }
    }
}

/// An action taken by the user (marker click, list click, back button).
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Select(TrainId),
    Deselect,
    SwitchServer(String),
}

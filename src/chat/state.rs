//! Connection state machine
//!
//! Every transport event goes through [`transition`], which decides the next
//! [`ConnectionState`] and the side effect the session has to carry out.

use super::models::Message;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session's live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// A connection attempt is in flight
    Connecting,
    /// The connection is open; sends are accepted
    Connected,
    /// No connection; a reconnect may be pending
    Disconnected,
    /// The transport failed, or activation was refused
    Error,
}

impl ConnectionState {
    /// Convert the state to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by a live connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Handshake completed
    Opened,
    /// A decoded inbound message
    MessageReceived(Message),
    /// Low-level transport failure; always followed by `Closed`
    TransportError(String),
    /// The connection ended, for any reason
    Closed {
        /// Close code, when the peer sent a close frame
        code: Option<u16>,
        /// Close reason, possibly empty
        reason: String,
    },
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Cancel any pending reconnect timer
    CancelReconnect,
    /// Merge the message into the history
    Append(Message),
    /// Drop the connection handle and schedule one reconnect
    ScheduleReconnect,
    /// Nothing beyond the state change
    None,
}

/// Outcome of applying an event to the current state
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State after the event
    pub next: ConnectionState,
    /// Side effect to perform
    pub action: Action,
}

/// Apply a connection event to the current state
pub fn transition(current: ConnectionState, event: ConnectionEvent) -> Transition {
    match event {
        ConnectionEvent::Opened => Transition {
            next: ConnectionState::Connected,
            action: Action::CancelReconnect,
        },
        ConnectionEvent::MessageReceived(message) => Transition {
            next: current,
            action: Action::Append(message),
        },
        // The close that follows schedules the reconnect.
        ConnectionEvent::TransportError(_) => Transition {
            next: ConnectionState::Error,
            action: Action::None,
        },
        ConnectionEvent::Closed { .. } => Transition {
            next: ConnectionState::Disconnected,
            action: Action::ScheduleReconnect,
        },
    }
}

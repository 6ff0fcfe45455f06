//! Connection and processing state, plus the published snapshot.

use crate::session::message::Message;
use serde::Serialize;

/// Admission status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No wallet, or the last admission check failed.
    #[default]
    NotConnected,
    /// Waiting in the server queue.
    Queuing,
    /// Admitted; chat is allowed.
    Ready,
}

/// What the session is currently doing with the user's last message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Waiting for user input.
    #[default]
    Idle,
    /// A chat request is in flight.
    Thinking,
    /// A background image job is being polled.
    Generating,
    /// A paid chat request (mint) is in flight.
    Minting,
}

impl ProcessingState {
    /// Whether a new user message may be submitted.
    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }
}

/// Read-only view of the session handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionSnapshot {
    /// Conversation log in display order.
    pub messages: Vec<Message>,
    /// Admission status.
    pub connection: ConnectionState,
    /// Queue position; zero unless queuing.
    pub queue_position: u32,
    /// Processing status.
    pub processing: ProcessingState,
    /// Outstanding image job token.
    pub pending_request: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let snap = SessionSnapshot::default();
        assert_eq!(snap.connection, ConnectionState::NotConnected);
        assert!(snap.processing.is_idle());
        assert!(snap.pending_request.is_none());
    }

    #[test]
    fn states_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(ConnectionState::NotConnected).unwrap_or_default(),
            "not_connected"
        );
        assert_eq!(
            serde_json::to_value(ProcessingState::Minting).unwrap_or_default(),
            "minting"
        );
    }
}

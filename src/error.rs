//! Error types for the Secret Hitler client.

use std::time::Duration;

use thiserror::Error;

use crate::error_codes::LoginError;
use crate::protocol::Phase;

/// Errors that can occur when using the Secret Hitler client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an open connection.
    #[error("not connected to server")]
    NotConnected,

    /// A player action was submitted while the previous one is still locked in.
    #[error("input locked for another {remaining:?}")]
    InputLocked {
        /// Time until input is accepted again.
        remaining: Duration,
    },

    /// A snapshot lacks a field that its phase requires.
    ///
    /// This indicates the client and server have desynchronized; it is never
    /// papered over with a default.
    #[error("snapshot in phase {phase:?} is missing `{field}`")]
    MissingField {
        /// Phase the snapshot was in.
        phase: Phase,
        /// Wire name of the missing field.
        field: &'static str,
    },

    /// A name was referenced that has no player record in the snapshot.
    #[error("unknown player: {0}")]
    UnknownPlayer(String),

    /// The snapshot violates a structural invariant.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// A lobby code did not have the expected shape.
    #[error("invalid lobby code: {0:?}")]
    InvalidLobbyCode(String),

    /// The server refused a login check.
    #[error("login rejected: {0}")]
    Login(LoginError),

    /// An HTTP request to the lobby server failed.
    #[error("http error: {0}")]
    Http(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_phase_and_field() {
        let err = ClientError::MissingField {
            phase: Phase::LegislativePresident,
            field: "presidentChoices",
        };
        let text = err.to_string();
        assert!(text.contains("LegislativePresident"));
        assert!(text.contains("presidentChoices"));
    }

    #[test]
    fn serde_errors_convert() {
        let err: ClientError = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert!(matches!(err, ClientError::Serialization(_)));
    }
}

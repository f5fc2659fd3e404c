//! Transport abstraction for the game connection.
//!
//! Every packet in the game protocol is one JSON text message, so a
//! [`Transport`] only moves whole strings and hides any framing.
//!
//! A game session reopens its link after a drop. Link setup therefore has its
//! own trait: a [`Connector`] dials a fresh transport for a `(name, lobby)`
//! pair each time the [`ConnectionManager`](crate::ConnectionManager) asks.
//!
//! # Plugging in another link
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use secret_hitler_client::error::ClientError;
//! use secret_hitler_client::protocol::LobbyCode;
//! use secret_hitler_client::transport::{Connector, Transport};
//!
//! struct Loopback;
//!
//! #[async_trait]
//! impl Transport for Loopback {
//!     async fn send(&mut self, _packet: String) -> Result<(), ClientError> {
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ClientError>> {
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ClientError> {
//!         Ok(())
//!     }
//! }
//!
//! struct LoopbackConnector;
//!
//! #[async_trait]
//! impl Connector for LoopbackConnector {
//!     type Transport = Loopback;
//!
//!     async fn connect(&self, _name: &str, _lobby: &LobbyCode) -> Result<Loopback, ClientError> {
//!         Ok(Loopback)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ClientError;
use crate::protocol::LobbyCode;

/// One open link to the lobby server.
///
/// `recv` is polled inside `tokio::select!` next to the keep-alive timer, so
/// it must be cancel-safe: dropping an unfinished `recv` future may not lose a
/// packet.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON packet.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TransportSend`] if the packet could not be
    /// written. The link is treated as dropped afterwards.
    async fn send(&mut self, packet: String) -> Result<(), ClientError>;

    /// Wait for the next JSON packet.
    ///
    /// `None` means the server closed the link. An `Err` is logged and also
    /// ends the link.
    async fn recv(&mut self) -> Option<Result<String, ClientError>>;

    /// Close the link on purpose. Resources are released even if the close
    /// handshake fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn close(&mut self) -> Result<(), ClientError>;
}

/// Dials game connections for a player in a lobby.
///
/// Called once per explicit open and once per reconnect attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Open a link for `name` in `lobby`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be opened. A failed reconnect is
    /// counted like another dropped link.
    async fn connect(&self, name: &str, lobby: &LobbyCode) -> Result<Self::Transport, ClientError>;
}

//! # Secret Hitler Client
//!
//! Client-side sync layer for Secret Hitler Online.
//!
//! The lobby server pushes a full game [`Snapshot`] after every change. This
//! crate turns that stream into an ordered sequence of things to show, one at
//! a time, and keeps the game connection alive while it does.
//!
//! ## Components
//!
//! - **[`ConnectionManager`]**: opens the game connection, sends keep-alives
//!   and reconnects within a fixed budget
//! - **[`diff`](diff::diff)**: compares two snapshots and reports what happened
//! - **[`PhaseEventMapper`]**: turns those events into [`PresentationTask`]s
//!   for one viewer
//! - **[`PresentationQueue`]**: runs the tasks strictly one at a time
//! - **[`AckRendezvous`]**: pairs each server `ok` with the prompt waiting
//!   for it
//!
//! [`SecretHitlerClient`] wires all of them into one background session and
//! reports [`ClientEvent`]s on a channel.
//!
//! ## Features
//!
//! - `transport-websocket` (default): [`WebSocketConnector`]
//! - `tokio-runtime`: the spawned session, [`SecretHitlerClient`]
//! - `http-client`: [`LobbyApi`](http::LobbyApi) for lobby creation and login checks

#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod connection;
pub mod diff;
pub mod error;
pub mod error_codes;
pub mod event;
#[cfg(feature = "http-client")]
pub mod http;
pub mod lockout;
pub mod mapper;
pub mod presentation;
pub mod protocol;
pub mod queue;
pub mod rendezvous;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
#[cfg(feature = "tokio-runtime")]
pub use client::{ClientConfig, SecretHitlerClient};
pub use connection::{ConnectionConfig, ConnectionManager};
pub use error::ClientError;
pub use error_codes::LoginError;
pub use event::ClientEvent;
pub use mapper::PhaseEventMapper;
pub use presentation::{Presentation, PresentationTask};
pub use protocol::{Command, LobbyCode, ServerMessage, Snapshot};
pub use queue::PresentationQueue;
pub use rendezvous::AckRendezvous;
pub use transport::{Connector, Transport};
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};

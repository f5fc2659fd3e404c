//! Events emitted by a running session.
//!
//! The renderer drains these from the receiver returned by
//! [`SecretHitlerClient::connect`](crate::client::SecretHitlerClient::connect).
//! Presentation events arrive in queue order: every
//! [`Present`](ClientEvent::Present) is followed by a matching
//! [`Finished`](ClientEvent::Finished) before the next one starts.

use std::collections::BTreeMap;

use crate::presentation::{Presentation, TaskId};
use crate::protocol::LobbyCode;

/// Everything a renderer needs to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The game connection was opened for `lobby`.
    Connected { lobby: LobbyCode },

    // ── Presentation ────────────────────────────────────────────────
    /// Start showing this task's content.
    Present {
        id: TaskId,
        presentation: Presentation,
    },
    /// Stop showing this task's content.
    Finished { id: TaskId },
    /// The queue has nothing left to show.
    Idle,
    /// Every queued presentation was dropped; hide whatever is on screen.
    Cleared,

    // ── Lobby ───────────────────────────────────────────────────────
    /// The lobby roster changed.
    LobbyUpdated {
        usernames: Vec<String>,
        icons: BTreeMap<String, String>,
    },

    // ── Connection ──────────────────────────────────────────────────
    /// Something the player should read; not tied to the queue.
    Notice(String),
    /// The link dropped and reconnect attempt `attempt` is under way.
    Retrying { attempt: u32 },
    /// The session is over. Always the last event on the channel.
    Disconnected {
        /// `None` when the player left the lobby.
        message: Option<String>,
    },
    /// A packet was rejected and the previous state kept.
    ProtocolError { reason: String },
}

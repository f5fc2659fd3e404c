#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for the Secret Hitler client integration tests.
//!
//! Provides a channel-backed [`MockConnector`] whose links are driven from the
//! test through a [`MockServer`], plus builders for snapshots and server
//! packets.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use secret_hitler_client::presentation::{Presentation, TaskId};
use secret_hitler_client::protocol::{
    LobbyCode, LobbyUpdate, Party, Phase, PlayerState, Role, ServerMessage, Snapshot,
};
use secret_hitler_client::{ClientError, ClientEvent, Connector, Transport};
use tokio::sync::mpsc;

/// What the server side pushes into a link: a packet, or `None` to close it.
type Push = Option<String>;

#[derive(Default)]
struct Shared {
    links: StdMutex<Vec<mpsc::UnboundedSender<Push>>>,
    refusals: AtomicUsize,
    sent: StdMutex<Vec<String>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

// ── MockTransport ───────────────────────────────────────────────────

/// One link. `recv` waits on a channel fed by [`MockServer`], so it is
/// cancel-safe.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Push>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ClientError> {
        self.shared.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        match self.incoming.recv().await {
            Some(Some(text)) => Some(Ok(text)),
            Some(None) => None,
            // The server handle is gone; stay open until the client closes.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.shared.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector / MockServer ──────────────────────────────────────

/// Hands out [`MockTransport`]s unless told to refuse.
pub struct MockConnector {
    shared: Arc<Shared>,
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, _name: &str, _lobby: &LobbyCode) -> Result<MockTransport, ClientError> {
        self.shared.connects.fetch_add(1, Ordering::Relaxed);
        let refused = self
            .shared
            .refusals
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ClientError::TransportClosed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.links.lock().unwrap().push(tx);
        Ok(MockTransport {
            incoming: rx,
            shared: Arc::clone(&self.shared),
        })
    }
}

/// The test's side of every link the connector opened.
#[derive(Clone)]
pub struct MockServer {
    shared: Arc<Shared>,
}

impl MockServer {
    /// Push a packet into the newest link.
    pub fn push(&self, packet: impl Into<String>) {
        let links = self.shared.links.lock().unwrap();
        let link = links.last().expect("no link open");
        let _ = link.send(Some(packet.into()));
    }

    /// Close the newest link from the server side.
    pub fn drop_link(&self) {
        let links = self.shared.links.lock().unwrap();
        let link = links.last().expect("no link open");
        let _ = link.send(None);
    }

    /// Make the next `n` connect attempts fail.
    pub fn refuse_next(&self, n: usize) {
        self.shared.refusals.fetch_add(n, Ordering::Relaxed);
    }

    /// Every message the client sent, parsed.
    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.shared
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// The `command` field of every message the client sent.
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|msg| msg["command"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::Relaxed)
    }

    /// Links the client closed on purpose.
    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::Relaxed)
    }
}

pub fn mock_server() -> (MockConnector, MockServer) {
    let shared = Arc::new(Shared::default());
    (
        MockConnector {
            shared: Arc::clone(&shared),
        },
        MockServer { shared },
    )
}

// ── Snapshot builders ───────────────────────────────────────────────

pub const TABLE: [&str; 5] = ["ann", "bob", "cat", "dan", "eve"];

/// A five-seat snapshot in `phase` with `president` in office and no roles
/// visible.
pub fn table(phase: Phase, president: &str) -> Snapshot {
    let mut snapshot = Snapshot {
        phase,
        player_order: TABLE.iter().map(|n| n.to_string()).collect(),
        president: Some(president.into()),
        ..Snapshot::default()
    };
    for name in TABLE {
        snapshot.players.insert(name.into(), PlayerState::default());
    }
    snapshot
}

/// Give `name` a visible role.
pub fn with_role(mut snapshot: Snapshot, name: &str, role: Role) -> Snapshot {
    if let Some(player) = snapshot.players.get_mut(name) {
        player.role = Some(role);
    }
    snapshot
}

// ── JSON helper functions ───────────────────────────────────────────

pub fn game_json(snapshot: &Snapshot) -> String {
    serde_json::to_string(&ServerMessage::Game(Box::new(snapshot.clone())))
        .expect("game_json serialization")
}

pub fn lobby_json(icons: &[(&str, &str)]) -> String {
    let icons: BTreeMap<String, String> = icons
        .iter()
        .map(|(name, icon)| (name.to_string(), icon.to_string()))
        .collect();
    serde_json::to_string(&ServerMessage::Lobby(LobbyUpdate {
        usernames: icons.keys().cloned().collect(),
        user_count: icons.len() as u32,
        lobby_size: None,
        icons,
    }))
    .expect("lobby_json serialization")
}

pub fn investigation_json(party: Party) -> String {
    serde_json::to_string(&ServerMessage::Investigation {
        investigation: party,
        target: None,
    })
    .expect("investigation_json serialization")
}

pub fn ok_json() -> String {
    serde_json::to_string(&ServerMessage::Ok).expect("ok_json serialization")
}

pub fn pong_json() -> String {
    serde_json::to_string(&ServerMessage::Pong).expect("pong_json serialization")
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive the next event, failing the test after five seconds.
pub async fn next_event(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skip events until one matches and return it.
pub async fn wait_for(
    events: &mut mpsc::Receiver<ClientEvent>,
    matches: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}

/// Skip events until a presentation matching `matches` starts; return its id.
pub async fn wait_for_present(
    events: &mut mpsc::Receiver<ClientEvent>,
    matches: impl Fn(&Presentation) -> bool,
) -> (TaskId, Presentation) {
    let event = wait_for(events, |e| {
        matches!(e, ClientEvent::Present { presentation, .. } if matches(presentation))
    })
    .await;
    match event {
        ClientEvent::Present { id, presentation } => (id, presentation),
        other => panic!("expected Present, got {other:?}"),
    }
}

/// Assert that nothing arrives for a while.
pub async fn assert_quiet(events: &mut mpsc::Receiver<ClientEvent>) {
    let waited = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
    assert!(waited.is_err(), "unexpected event: {waited:?}");
}

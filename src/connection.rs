//! Lifecycle of the single game connection.
//!
//! [`ConnectionManager`] owns the live transport, the keep-alive timer and the
//! reconnect budget. It does not run on its own: the session loop polls
//! [`next_event`](ConnectionManager::next_event) and reports every
//! [`ConnectionEvent::Closed`] back through
//! [`handle_closed`](ConnectionManager::handle_closed), which decides between
//! retrying, giving up, and ignoring the close.
//!
//! # Reconnect budget
//!
//! The failure counter is reset by an explicit [`open`](ConnectionManager::open)
//! and by every message received. Each unexpected close while reconnection is
//! enabled costs one attempt:
//!
//! - attempts left: reopen with the last name and lobby; every attempt after
//!   the first surfaces [`RETRY_NOTICE`]
//! - budget spent: [`ConnectionState::TerminallyClosed`] with [`TERMINAL_NOTICE`]
//! - reconnection disabled (player left, game over): the close is ignored

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::protocol::{Command, LobbyCode, OutboundMessage};
use crate::transport::{Connector, Transport};

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_FAILED_CONNECTIONS: u32 = 3;

/// Default interval between keep-alive pings.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Shown while a reconnect is in progress (not on the first attempt).
pub const RETRY_NOTICE: &str = "Lost connection to the server: retrying...";

/// Shown when the reconnect budget is spent.
pub const TERMINAL_NOTICE: &str = "Disconnected from the lobby.";

// ── Configuration ───────────────────────────────────────────────────

/// Reconnect and keep-alive settings.
///
/// ```
/// use secret_hitler_client::connection::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::default()
///     .with_max_failed_connections(5)
///     .with_keepalive_interval(Duration::from_secs(30));
/// assert_eq!(config.max_failed_connections, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Reconnect attempts allowed before the connection is given up.
    ///
    /// Defaults to **3**.
    pub max_failed_connections: u32,
    /// Interval between keep-alive pings while open.
    ///
    /// Defaults to **10 seconds**. Values below 1 ms are clamped to 1 ms.
    pub keepalive_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_failed_connections: DEFAULT_MAX_FAILED_CONNECTIONS,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn with_max_failed_connections(mut self, max: u32) -> Self {
        self.max_failed_connections = max;
        self
    }

    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval.max(Duration::from_millis(1));
        self
    }
}

// ── States and events ───────────────────────────────────────────────

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never opened, or closed on purpose.
    Idle,
    Connecting,
    Open,
    /// The link dropped and the close has not been handled yet.
    Closing,
    /// Reconnect attempt `n` is in progress or has just failed.
    Reconnecting(u32),
    /// The reconnect budget is spent. Only an explicit open leaves this state.
    TerminallyClosed,
}

/// What [`ConnectionManager::next_event`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One inbound text packet.
    Message(String),
    /// The link is gone; pass this to [`ConnectionManager::handle_closed`].
    Closed,
    /// Time to call [`ConnectionManager::send_keepalive`].
    KeepAliveDue,
}

/// The decision taken for a close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// A reconnect was attempted.
    Retrying {
        attempt: u32,
        /// Text to surface to the player, if any.
        notice: Option<String>,
    },
    /// The budget is spent; the session should clear its presentations.
    Terminal { message: String },
    /// Reconnection was disabled; nothing changes.
    Ignored,
}

// ── Manager ─────────────────────────────────────────────────────────

/// Owns the game connection for one session.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: ConnectionConfig,
    transport: Option<C::Transport>,
    keepalive: Option<Interval>,
    state: ConnectionState,
    credentials: Option<(String, LobbyCode)>,
    failed: u32,
    reconnect: bool,
    /// A reconnect attempt failed to connect; report it as a close.
    pending_close: bool,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self {
            connector,
            config,
            transport: None,
            keepalive: None,
            state: ConnectionState::Idle,
            credentials: None,
            failed: 0,
            reconnect: false,
            pending_close: false,
        }
    }

    /// Open a connection for `name` in `lobby`.
    ///
    /// Any existing link is closed first without producing a close event.
    /// On success the failure counter is reset, reconnection is enabled and
    /// the keep-alive starts.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the connection cannot be established;
    /// the manager is then [`Idle`](ConnectionState::Idle).
    pub async fn open(&mut self, name: &str, lobby: &LobbyCode) -> Result<()> {
        self.teardown().await;
        self.credentials = Some((name.to_string(), lobby.clone()));
        self.state = ConnectionState::Connecting;
        info!(name, %lobby, "opening game connection");

        match self.connector.connect(name, lobby).await {
            Ok(transport) => {
                self.attach(transport);
                self.failed = 0;
                self.reconnect = true;
                Ok(())
            }
            Err(e) => {
                warn!(name, %lobby, "game connection failed: {e}");
                self.state = ConnectionState::Idle;
                Err(e)
            }
        }
    }

    /// Send a command, tagged with the current name and lobby.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] if no link is open. A transport
    /// failure is returned as-is and the link is treated as dropped: the next
    /// [`next_event`](Self::next_event) reports [`ConnectionEvent::Closed`].
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        let (Some(transport), Some((name, lobby))) =
            (self.transport.as_mut(), self.credentials.as_ref())
        else {
            return Err(ClientError::NotConnected);
        };
        let json = OutboundMessage::new(command, name, lobby).to_json()?;
        debug!(command = command.name(), "sending command");

        if let Err(e) = transport.send(json).await {
            warn!(command = command.name(), "send failed: {e}");
            self.drop_link();
            self.pending_close = true;
            return Err(e);
        }
        Ok(())
    }

    /// Send the periodic keep-alive ping.
    ///
    /// # Errors
    ///
    /// As for [`send`](Self::send).
    pub async fn send_keepalive(&mut self) -> Result<()> {
        self.send(&Command::Ping).await
    }

    /// Wait for the next thing that happens on the link.
    ///
    /// Pends forever while no link is open. This method is cancel-safe: it
    /// only awaits the keep-alive tick and [`Transport::recv`].
    pub async fn next_event(&mut self) -> ConnectionEvent {
        if self.pending_close {
            self.pending_close = false;
            return ConnectionEvent::Closed;
        }
        let Some(transport) = self.transport.as_mut() else {
            return std::future::pending().await;
        };

        let incoming = match self.keepalive.as_mut() {
            Some(keepalive) => tokio::select! {
                _ = keepalive.tick() => return ConnectionEvent::KeepAliveDue,
                incoming = transport.recv() => incoming,
            },
            None => transport.recv().await,
        };

        match incoming {
            Some(Ok(text)) => {
                self.failed = 0;
                ConnectionEvent::Message(text)
            }
            Some(Err(e)) => {
                warn!("game connection error: {e}");
                self.drop_link();
                ConnectionEvent::Closed
            }
            None => {
                debug!("game connection closed by server");
                self.drop_link();
                ConnectionEvent::Closed
            }
        }
    }

    /// Decide what a close means and act on it.
    pub async fn handle_closed(&mut self) -> CloseOutcome {
        self.drop_link();
        self.pending_close = false;

        if !self.reconnect {
            debug!("close after reconnection was disabled; ignoring");
            self.state = ConnectionState::Idle;
            return CloseOutcome::Ignored;
        }

        if self.failed < self.config.max_failed_connections {
            let notice = (self.failed >= 1).then(|| RETRY_NOTICE.to_string());
            self.failed += 1;
            self.state = ConnectionState::Reconnecting(self.failed);
            info!(attempt = self.failed, "reconnecting");
            self.reopen().await;
            CloseOutcome::Retrying {
                attempt: self.failed,
                notice,
            }
        } else {
            warn!(
                attempts = self.failed,
                "reconnect budget spent; giving up"
            );
            self.state = ConnectionState::TerminallyClosed;
            self.reconnect = false;
            CloseOutcome::Terminal {
                message: TERMINAL_NOTICE.to_string(),
            }
        }
    }

    /// Close on purpose. Later closes are ignored until the next open.
    pub async fn leave(&mut self) {
        self.reconnect = false;
        self.teardown().await;
        self.state = ConnectionState::Idle;
    }

    /// Stop reconnecting without closing the link.
    pub fn disable_reconnect(&mut self) {
        self.reconnect = false;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn reconnect_enabled(&self) -> bool {
        self.reconnect
    }

    pub fn failed_connections(&self) -> u32 {
        self.failed
    }

    /// Name and lobby of the last open.
    pub fn credentials(&self) -> Option<(&str, &LobbyCode)> {
        self.credentials
            .as_ref()
            .map(|(name, lobby)| (name.as_str(), lobby))
    }

    /// Reconnect with the stored credentials. A failure is reported as a
    /// close on the next poll.
    async fn reopen(&mut self) {
        let Some((name, lobby)) = self.credentials.clone() else {
            self.pending_close = true;
            return;
        };
        match self.connector.connect(&name, &lobby).await {
            Ok(transport) => {
                self.attach(transport);
                debug!(attempt = self.failed, "reconnected");
            }
            Err(e) => {
                warn!(attempt = self.failed, "reconnect failed: {e}");
                self.pending_close = true;
            }
        }
    }

    fn attach(&mut self, transport: C::Transport) {
        let period = self.config.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.transport = Some(transport);
        self.keepalive = Some(keepalive);
        self.state = ConnectionState::Open;
    }

    fn drop_link(&mut self) {
        self.keepalive = None;
        if self.transport.take().is_some() {
            self.state = ConnectionState::Closing;
        }
    }

    /// Close the current link without reporting it.
    async fn teardown(&mut self) {
        self.keepalive = None;
        self.pending_close = false;
        if let Some(mut transport) = self.transport.take() {
            self.state = ConnectionState::Closing;
            if let Err(e) = transport.close().await {
                debug!("error closing previous link: {e}");
            }
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("failed", &self.failed)
            .field("reconnect", &self.reconnect)
            .field("open", &self.transport.is_some())
            .finish()
    }
}

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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    type Script = Vec<Option<Result<String>>>;

    struct ScriptedTransport {
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Each connect pops the next script; `None` makes the connect fail.
    #[derive(Clone)]
    struct ScriptedConnector {
        scripts: Arc<StdMutex<VecDeque<Option<Script>>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<StdMutex<Vec<Arc<AtomicBool>>>>,
        connects: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<Option<Script>>) -> Self {
            Self {
                scripts: Arc::new(StdMutex::new(scripts.into())),
                sent: Arc::default(),
                closed: Arc::default(),
                connects: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Transport = ScriptedTransport;

        async fn connect(&self, _name: &str, _lobby: &LobbyCode) -> Result<ScriptedTransport> {
            self.connects.fetch_add(1, Ordering::Relaxed);
            let script = self.scripts.lock().unwrap().pop_front().flatten();
            let Some(script) = script else {
                return Err(ClientError::TransportClosed);
            };
            let closed = Arc::new(AtomicBool::new(false));
            self.closed.lock().unwrap().push(Arc::clone(&closed));
            Ok(ScriptedTransport {
                incoming: script.into(),
                sent: Arc::clone(&self.sent),
                closed,
            })
        }
    }

    fn lobby() -> LobbyCode {
        LobbyCode::parse("ABCD").unwrap()
    }

    fn drops_at_once() -> Option<Script> {
        Some(vec![None])
    }

    /// Four closes in total: the first loss of the open link, then one for
    /// each of the three reconnects that drop straight away. The budget
    /// counts failed connections, so the fourth close is terminal.
    #[tokio::test]
    async fn loss_then_three_failed_reconnects_is_terminal() {
        let connector = ScriptedConnector::new(vec![
            drops_at_once(),
            drops_at_once(),
            drops_at_once(),
            drops_at_once(),
        ]);
        let mut manager = ConnectionManager::new(connector, ConnectionConfig::default());
        manager.open("ann", &lobby()).await.unwrap();

        let mut notices = Vec::new();
        let mut outcome = CloseOutcome::Ignored;
        for _ in 0..4 {
            assert_eq!(manager.next_event().await, ConnectionEvent::Closed);
            outcome = manager.handle_closed().await;
            if let CloseOutcome::Retrying {
                notice: Some(text), ..
            } = &outcome
            {
                notices.push(text.clone());
            }
        }

        assert_eq!(notices, vec![RETRY_NOTICE, RETRY_NOTICE]);
        assert_eq!(
            outcome,
            CloseOutcome::Terminal {
                message: TERMINAL_NOTICE.into()
            }
        );
        assert_eq!(manager.state(), ConnectionState::TerminallyClosed);
        assert!(!manager.reconnect_enabled());
    }

    #[tokio::test]
    async fn first_retry_is_silent() {
        let connector = ScriptedConnector::new(vec![drops_at_once(), Some(vec![])]);
        let mut manager = ConnectionManager::new(connector, ConnectionConfig::default());
        manager.open("ann", &lobby()).await.unwrap();

        assert_eq!(manager.next_event().await, ConnectionEvent::Closed);
        assert_eq!(
            manager.handle_closed().await,
            CloseOutcome::Retrying {
                attempt: 1,
                notice: None
            }
        );
        assert!(manager.is_open());
        assert_eq!(manager.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn received_message_resets_the_budget() {
        let connector = ScriptedConnector::new(vec![
            drops_at_once(),
            Some(vec![Some(Ok(r#"{"type":"pong"}"#.into())), None]),
            drops_at_once(),
        ]);
        let mut manager = ConnectionManager::new(connector, ConnectionConfig::default());
        manager.open("ann", &lobby()).await.unwrap();

        manager.next_event().await;
        manager.handle_closed().await;
        assert_eq!(manager.failed_connections(), 1);

        assert!(matches!(
            manager.next_event().await,
            ConnectionEvent::Message(_)
        ));
        assert_eq!(manager.failed_connections(), 0);

        manager.next_event().await;
        assert_eq!(
            manager.handle_closed().await,
            CloseOutcome::Retrying {
                attempt: 1,
                notice: None
            }
        );
    }

    #[tokio::test]
    async fn failed_reconnect_reads_as_another_close() {
        let connector = ScriptedConnector::new(vec![drops_at_once(), None, Some(vec![])]);
        let mut manager = ConnectionManager::new(connector.clone(), ConnectionConfig::default());
        manager.open("ann", &lobby()).await.unwrap();

        manager.next_event().await;
        manager.handle_closed().await;
        assert_eq!(manager.state(), ConnectionState::Reconnecting(1));
        assert!(!manager.is_open());

        assert_eq!(manager.next_event().await, ConnectionEvent::Closed);
        assert_eq!(
            manager.handle_closed().await,
            CloseOutcome::Retrying {
                attempt: 2,
                notice: Some(RETRY_NOTICE.into())
            }
        );
        assert!(manager.is_open());
        assert_eq!(connector.connects.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn close_after_leave_is_ignored() {
        let connector = ScriptedConnector::new(vec![Some(vec![])]);
        let mut manager = ConnectionManager::new(connector.clone(), ConnectionConfig::default());
        manager.open("ann", &lobby()).await.unwrap();

        manager.leave().await;
        assert!(connector.closed.lock().unwrap()[0].load(Ordering::Relaxed));
        assert_eq!(manager.handle_closed().await, CloseOutcome::Ignored);
        assert_eq!(manager.state(), ConnectionState::Idle);

        let waited =
            tokio::time::timeout(Duration::from_secs(60), manager.next_event()).await;
        assert!(waited.is_err(), "no events after leaving");
        assert_eq!(connector.connects.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_tears_down_without_a_close() {
        let connector = ScriptedConnector::new(vec![Some(vec![]), Some(vec![])]);
        let mut manager = ConnectionManager::new(connector.clone(), ConnectionConfig::default());
        manager.open("ann", &lobby()).await.unwrap();
        manager.open("ann", &lobby()).await.unwrap();

        assert!(connector.closed.lock().unwrap()[0].load(Ordering::Relaxed));
        let waited = tokio::time::timeout(Duration::from_secs(1), manager.next_event()).await;
        assert!(waited.is_err());
        assert_eq!(manager.failed_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_ticks_while_open() {
        let connector = ScriptedConnector::new(vec![Some(vec![])]);
        let config = ConnectionConfig::default().with_keepalive_interval(Duration::from_secs(5));
        let mut manager = ConnectionManager::new(connector.clone(), config);
        manager.open("ann", &lobby()).await.unwrap();

        let start = Instant::now();
        assert_eq!(manager.next_event().await, ConnectionEvent::KeepAliveDue);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        manager.send_keepalive().await.unwrap();

        let sent = connector.sent.lock().unwrap();
        let ping: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(ping["command"], "ping");
        assert_eq!(ping["name"], "ann");
        assert_eq!(ping["lobby"], "ABCD");
    }

    #[tokio::test]
    async fn send_without_link_is_not_connected() {
        let connector = ScriptedConnector::new(vec![]);
        let mut manager = ConnectionManager::new(connector, ConnectionConfig::default());
        assert!(matches!(
            manager.send(&Command::GetState).await,
            Err(ClientError::NotConnected)
        ));
        assert!(manager.open("ann", &lobby()).await.is_err());
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn next_event_pends_without_a_link() {
        let connector = ScriptedConnector::new(vec![]);
        let mut manager = ConnectionManager::new(connector, ConnectionConfig::default());
        let mut next = tokio_test::task::spawn(manager.next_event());
        tokio_test::assert_pending!(next.poll());
        tokio_test::assert_pending!(next.poll());
    }
}

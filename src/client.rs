//! Async session handle for one player in one lobby.
//!
//! [`SecretHitlerClient`] is a thin handle that talks to a background session
//! loop over an unbounded MPSC channel. The loop owns the
//! [`ConnectionManager`], the last accepted [`Snapshot`], the
//! [`PhaseEventMapper`] and the [`PresentationQueue`]; renderers consume the
//! resulting [`ClientEvent`]s from the bounded receiver returned by
//! [`SecretHitlerClient::connect`].
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("https://sh.example.com")?;
//! let config = ClientConfig::new("ann", LobbyCode::parse("ABCD")?);
//! let (mut client, mut events) = SecretHitlerClient::connect(connector, config).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ClientEvent::Present { id, presentation } => { /* draw it */ }
//!         ClientEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::connection::{CloseOutcome, ConnectionConfig, ConnectionEvent, ConnectionManager};
use crate::diff::diff;
use crate::error::{ClientError, Result};
use crate::event::ClientEvent;
use crate::lockout::{SubmitLockout, DEFAULT_SUBMIT_LOCKOUT};
use crate::mapper::PhaseEventMapper;
use crate::presentation::{Presentation, PresentationTask, PresentationTimings, TaskId};
use crate::protocol::{Command, LobbyCode, LobbyUpdate, Party, ServerMessage, Snapshot, DEFAULT_ICON};
use crate::queue::{PresentationQueue, Transition};
use crate::transport::Connector;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SecretHitlerClient`] session.
///
/// # Example
///
/// ```
/// use secret_hitler_client::client::ClientConfig;
/// use secret_hitler_client::presentation::PresentationTimings;
/// use secret_hitler_client::protocol::LobbyCode;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("ann", LobbyCode::parse("abcd").unwrap())
///     .with_timings(PresentationTimings::instant())
///     .with_submit_lockout(Duration::from_secs(2));
/// assert_eq!(config.lobby.as_str(), "ABCD");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Player name, unique within the lobby.
    pub name: String,
    pub lobby: LobbyCode,
    /// Durations of timed presentations.
    pub timings: PresentationTimings,
    /// Reconnect budget and keep-alive interval.
    pub connection: ConnectionConfig,
    /// How long player actions are refused after one is submitted.
    ///
    /// Defaults to **4 seconds**.
    pub submit_lockout: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the renderer cannot keep up, events are dropped (with a warning
    /// logged) rather than stalling the session loop. The final
    /// `Disconnected` event is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the session loop gets to close the link on
    /// [`SecretHitlerClient::shutdown`] before it is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    pub fn new(name: impl Into<String>, lobby: LobbyCode) -> Self {
        Self {
            name: name.into(),
            lobby,
            timings: PresentationTimings::default(),
            connection: ConnectionConfig::default(),
            submit_lockout: DEFAULT_SUBMIT_LOCKOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timings(mut self, timings: PresentationTimings) -> Self {
        self.timings = timings;
        self
    }

    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn with_submit_lockout(mut self, window: Duration) -> Self {
        self.submit_lockout = window;
        self
    }

    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the handle and the session loop.
struct ClientState {
    connected: AtomicBool,
    presenting: AtomicBool,
    lockout: Mutex<SubmitLockout>,
}

/// Requests from the handle to the session loop.
#[derive(Debug)]
enum SessionCommand {
    Submit(Command),
    Dismiss(TaskId),
    ReturnToLobby,
    Leave,
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running game session.
///
/// Methods queue a request for the session loop and return once it is
/// queued; results show up as [`ClientEvent`]s.
pub struct SecretHitlerClient {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    state: Arc<ClientState>,
    name: String,
    lobby: LobbyCode,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SecretHitlerClient {
    /// Open the game connection and start the session loop.
    ///
    /// The first event on the returned receiver is
    /// [`ClientEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the first connection fails.
    pub async fn connect<C: Connector>(
        connector: C,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let mut connection = ConnectionManager::new(connector, config.connection);
        connection.open(&config.name, &config.lobby).await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<SessionCommand>();
        // tokio panics on a zero capacity.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ClientEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState {
            connected: AtomicBool::new(true),
            presenting: AtomicBool::new(false),
            lockout: Mutex::new(SubmitLockout::new(config.submit_lockout)),
        });

        let session = Session {
            connection,
            queue: PresentationQueue::new(),
            mapper: PhaseEventMapper::new(config.timings),
            snapshot: Snapshot::default(),
            name: config.name.clone(),
            lobby: config.lobby.clone(),
            event_tx,
            state: Arc::clone(&state),
            pending_investigation: None,
            icon_prompt: None,
        };
        let task = tokio::spawn(session_loop(session, cmd_rx, shutdown_rx));

        let client = Self {
            cmd_tx,
            state,
            name: config.name,
            lobby: config.lobby,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        Ok((client, event_rx))
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Send a command to the server.
    ///
    /// Player actions take the submit lock; keep-alives, state requests and
    /// game starts do not.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] while no link is open and
    /// [`ClientError::InputLocked`] if a previous action is still locked in.
    pub async fn submit(&self, command: Command) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if command.is_player_action() {
            self.state
                .lockout
                .lock()
                .await
                .try_acquire(Instant::now())?;
        }
        self.send(SessionCommand::Submit(command))
    }

    /// Close presentation `id`. Closing the victory screen returns to the
    /// lobby.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] once the session has ended.
    pub fn dismiss(&self, id: TaskId) -> Result<()> {
        self.send(SessionCommand::Dismiss(id))
    }

    /// Drop the finished game and rejoin the lobby.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] once the session has ended.
    pub async fn return_to_lobby(&self) -> Result<()> {
        self.state.lockout.lock().await.release();
        self.send(SessionCommand::ReturnToLobby)
    }

    /// Leave the lobby. The session ends without reconnecting.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] once the session has ended.
    pub fn leave(&self) -> Result<()> {
        self.send(SessionCommand::Leave)
    }

    /// Shut down the session, closing the link and stopping the loop.
    ///
    /// The event receiver yields `None` once the loop exits.
    pub async fn shutdown(&mut self) {
        debug!("SecretHitlerClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Whether the game connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Whether a presentation is on screen.
    pub fn is_presenting(&self) -> bool {
        self.state.presenting.load(Ordering::Acquire)
    }

    /// Time left before another player action is accepted.
    pub async fn lockout_remaining(&self) -> Option<Duration> {
        self.state.lockout.lock().await.remaining(Instant::now())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lobby(&self) -> &LobbyCode {
        &self.lobby
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| ClientError::NotConnected)
    }
}

impl std::fmt::Debug for SecretHitlerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHitlerClient")
            .field("name", &self.name)
            .field("lobby", &self.lobby)
            .field("connected", &self.is_connected())
            .field("presenting", &self.is_presenting())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SecretHitlerClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Everything the session loop owns.
struct Session<C: Connector> {
    connection: ConnectionManager<C>,
    queue: PresentationQueue,
    mapper: PhaseEventMapper,
    /// Last snapshot that diffed and mapped cleanly.
    snapshot: Snapshot,
    name: String,
    lobby: LobbyCode,
    event_tx: mpsc::Sender<ClientEvent>,
    state: Arc<ClientState>,
    /// Target of the last investigation request; the answer does not name it.
    pending_investigation: Option<String>,
    icon_prompt: Option<TaskId>,
}

/// Multiplexes handle requests, presentation timers and the connection.
///
/// Exits when:
/// - the handle is shut down or dropped
/// - the player leaves the lobby
/// - the reconnect budget is spent, or rejoining the lobby fails
async fn session_loop<C: Connector>(
    mut session: Session<C>,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!(name = %session.name, lobby = %session.lobby, "session loop started");
    let lobby = session.lobby.clone();
    emit_event(&session.event_tx, ClientEvent::Connected { lobby }).await;

    loop {
        let deadline = session.queue.deadline();
        let flow = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => session.handle_command(cmd).await,
                None => {
                    debug!("command channel closed, shutting down session loop");
                    session.close().await
                }
            },

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                session.close().await
            }

            () = sleep_until(deadline) => {
                let transitions = session.queue.poll_deadline(Instant::now());
                session.apply(transitions).await;
                ControlFlow::Continue(())
            }

            event = session.connection.next_event() => session.handle_connection(event).await,
        };
        session.sync_state();
        if flow.is_break() {
            break;
        }
    }

    debug!("session loop exited");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<C: Connector> Session<C> {
    async fn handle_command(&mut self, command: SessionCommand) -> ControlFlow<()> {
        match command {
            SessionCommand::Submit(command) => {
                if let Command::GetInvestigation { target } = &command {
                    self.pending_investigation = Some(target.clone());
                }
                if let Err(e) = self.connection.send(&command).await {
                    warn!(command = command.name(), "command not sent: {e}");
                    self.emit(ClientEvent::Notice(format!(
                        "Could not send {}: {e}",
                        command.name()
                    )))
                    .await;
                }
                ControlFlow::Continue(())
            }
            SessionCommand::Dismiss(id) => {
                let ends_game =
                    matches!(self.queue.current(), Some((current, p)) if current == id && p.is_terminal());
                if ends_game {
                    return self.return_to_lobby().await;
                }
                let fade = self.mapper.timings().alert_fade;
                let transitions = self.queue.dismiss(id, fade, Instant::now());
                self.apply(transitions).await;
                ControlFlow::Continue(())
            }
            SessionCommand::ReturnToLobby => self.return_to_lobby().await,
            SessionCommand::Leave => {
                info!(name = %self.name, lobby = %self.lobby, "leaving lobby");
                self.connection.leave().await;
                self.clear().await;
                emit_disconnected(&self.event_tx, &self.state, None).await;
                ControlFlow::Break(())
            }
        }
    }

    async fn handle_connection(&mut self, event: ConnectionEvent) -> ControlFlow<()> {
        match event {
            ConnectionEvent::Message(text) => {
                self.handle_packet(&text).await;
                ControlFlow::Continue(())
            }
            ConnectionEvent::KeepAliveDue => {
                if let Err(e) = self.connection.send_keepalive().await {
                    warn!("keep-alive not sent: {e}");
                }
                ControlFlow::Continue(())
            }
            ConnectionEvent::Closed => match self.connection.handle_closed().await {
                CloseOutcome::Retrying { attempt, notice } => {
                    self.emit(ClientEvent::Retrying { attempt }).await;
                    if let Some(notice) = notice {
                        self.emit(ClientEvent::Notice(notice)).await;
                    }
                    ControlFlow::Continue(())
                }
                CloseOutcome::Terminal { message } => {
                    self.clear().await;
                    emit_disconnected(&self.event_tx, &self.state, Some(message)).await;
                    ControlFlow::Break(())
                }
                CloseOutcome::Ignored => ControlFlow::Continue(()),
            },
        }
    }

    async fn handle_packet(&mut self, text: &str) {
        let message = match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("failed to deserialize server message: {e} (raw: {text})");
                self.emit(ClientEvent::ProtocolError {
                    reason: e.to_string(),
                })
                .await;
                return;
            }
        };

        match message {
            ServerMessage::Game(snapshot) => self.on_snapshot(*snapshot).await,
            ServerMessage::Ok => {
                let transitions = self.queue.acknowledge(Instant::now());
                self.apply(transitions).await;
            }
            ServerMessage::Lobby(update) => self.on_lobby(update).await,
            ServerMessage::Investigation {
                investigation,
                target,
            } => self.on_investigation(investigation, target).await,
            ServerMessage::Pong => trace!("pong"),
        }
    }

    /// Diff against the last accepted snapshot, map, then queue. A snapshot
    /// that fails either step is dropped and the previous one kept.
    async fn on_snapshot(&mut self, snapshot: Snapshot) {
        let mapped = diff(&self.snapshot, &snapshot)
            .and_then(|events| self.mapper.map(&events, &snapshot, &self.name));
        let tasks = match mapped {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(phase = ?snapshot.phase, "snapshot rejected: {e}");
                self.emit(ClientEvent::ProtocolError {
                    reason: e.to_string(),
                })
                .await;
                return;
            }
        };
        self.snapshot = snapshot;
        for task in tasks {
            self.enqueue(task).await;
        }
    }

    async fn on_lobby(&mut self, update: LobbyUpdate) {
        let default_icon = update
            .icons
            .get(&self.name)
            .is_some_and(|icon| icon == DEFAULT_ICON);
        self.emit(ClientEvent::LobbyUpdated {
            usernames: update.usernames,
            icons: update.icons,
        })
        .await;

        if default_icon && self.icon_prompt.is_none() {
            let id = self
                .enqueue(PresentationTask::dismissable(Presentation::IconSelection))
                .await;
            self.icon_prompt = Some(id);
        }
    }

    async fn on_investigation(&mut self, party: Party, target: Option<String>) {
        let pending = self.pending_investigation.take();
        let Some(target) = target.or(pending) else {
            warn!("investigation result with no known target");
            self.emit(ClientEvent::ProtocolError {
                reason: "investigation result with no known target".into(),
            })
            .await;
            return;
        };
        self.enqueue(PresentationTask::dismissable(
            Presentation::InvestigationResult { target, party },
        ))
        .await;
    }

    async fn return_to_lobby(&mut self) -> ControlFlow<()> {
        info!(name = %self.name, lobby = %self.lobby, "returning to lobby");
        self.clear().await;
        self.snapshot = Snapshot::default();
        self.pending_investigation = None;

        match self.connection.open(&self.name, &self.lobby).await {
            Ok(()) => {
                let lobby = self.lobby.clone();
                self.emit(ClientEvent::Connected { lobby }).await;
                ControlFlow::Continue(())
            }
            Err(e) => {
                error!("could not rejoin lobby: {e}");
                emit_disconnected(
                    &self.event_tx,
                    &self.state,
                    Some(format!("could not rejoin the lobby: {e}")),
                )
                .await;
                ControlFlow::Break(())
            }
        }
    }

    async fn enqueue(&mut self, task: PresentationTask) -> TaskId {
        let (id, transitions) = self.queue.enqueue(task, Instant::now());
        self.apply(transitions).await;
        id
    }

    /// Forward queue transitions to the renderer.
    ///
    /// A victory screen closes the connection as it starts.
    async fn apply(&mut self, transitions: Vec<Transition>) {
        for transition in transitions {
            match transition {
                Transition::Started { id, presentation } => {
                    self.state.presenting.store(true, Ordering::Release);
                    let game_over = presentation.is_terminal();
                    self.emit(ClientEvent::Present { id, presentation }).await;
                    if game_over {
                        info!("game over; closing connection");
                        self.connection.leave().await;
                    }
                }
                Transition::Finished { id } => {
                    if self.icon_prompt == Some(id) {
                        self.icon_prompt = None;
                    }
                    self.emit(ClientEvent::Finished { id }).await;
                }
                Transition::Idle => {
                    self.state.presenting.store(false, Ordering::Release);
                    self.emit(ClientEvent::Idle).await;
                }
            }
        }
    }

    /// Drop every presentation and hide the one on screen.
    async fn clear(&mut self) {
        if let Some(id) = self.queue.clear() {
            self.emit(ClientEvent::Finished { id }).await;
        }
        self.icon_prompt = None;
        self.state.presenting.store(false, Ordering::Release);
        self.emit(ClientEvent::Cleared).await;
    }

    async fn close(&mut self) -> ControlFlow<()> {
        self.connection.leave().await;
        emit_disconnected(
            &self.event_tx,
            &self.state,
            Some("client shut down".into()),
        )
        .await;
        ControlFlow::Break(())
    }

    fn sync_state(&self) {
        self.state
            .connected
            .store(self.connection.is_open(), Ordering::Release);
        self.state
            .presenting
            .store(!self.queue.is_idle(), Ordering::Release);
    }

    /// `&mut self`: a shared borrow held across the await would make the
    /// session future require a `Sync` transport.
    async fn emit(&mut self, event: ClientEvent) {
        emit_event(&self.event_tx, event).await;
    }
}

/// Emit an event without blocking; if the channel is full the event is
/// dropped with a warning.
async fn emit_event(event_tx: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit the final [`Disconnected`](ClientEvent::Disconnected) event.
///
/// Waits for channel capacity instead of dropping: it is always the last
/// event and must be delivered.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<ClientEvent>,
    state: &ClientState,
    message: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    state.presenting.store(false, Ordering::Release);
    if event_tx
        .send(ClientEvent::Disconnected { message })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::connection::TERMINAL_NOTICE;
    use crate::protocol::{Phase, PlayerState};
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::marker::PhantomData;
    use std::sync::Mutex as StdMutex;

    type Script = Vec<Option<Result<String>>>;

    // ── Mock connector ──────────────────────────────────────────────

    /// `Send` but not `Sync`, like most real sockets.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        _not_sync: PhantomData<Cell<()>>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                // Stay open until the session closes it.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Each connect takes the next script; a missing script fails the connect.
    struct MockConnector {
        scripts: StdMutex<VecDeque<Script>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockConnector {
        fn new(scripts: Vec<Script>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let connector = Self {
                scripts: StdMutex::new(scripts.into()),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (connector, sent, closed)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&self, _name: &str, _lobby: &LobbyCode) -> Result<MockTransport> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(ClientError::TransportClosed)?;
            Ok(MockTransport {
                incoming: script.into(),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
                _not_sync: PhantomData,
            })
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn config() -> ClientConfig {
        ClientConfig::new("ann", LobbyCode::parse("ABCD").unwrap())
            .with_timings(PresentationTimings::instant())
    }

    fn nomination_json(president: &str) -> String {
        let mut snapshot = Snapshot {
            phase: Phase::ChancellorNomination,
            player_order: vec!["ann".into(), "bob".into(), "cat".into()],
            president: Some(president.into()),
            liberal_policies: 1,
            ..Snapshot::default()
        };
        for name in ["ann", "bob", "cat"] {
            snapshot.players.insert(name.into(), PlayerState::default());
        }
        serde_json::to_string(&ServerMessage::Game(Box::new(snapshot))).unwrap()
    }

    fn ok_json() -> String {
        serde_json::to_string(&ServerMessage::Ok).unwrap()
    }

    async fn next_event(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Skip events until one matches.
    async fn wait_for(
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

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn connected_is_first_event() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![]]);
        let (mut client, mut events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();

        let first = next_event(&mut events).await;
        assert_eq!(
            first,
            ClientEvent::Connected {
                lobby: LobbyCode::parse("ABCD").unwrap()
            }
        );
        assert!(client.is_connected());
        client.shutdown().await;
    }

    fn assert_spawnable<F: std::future::Future + Send + 'static>(_: &F) {}

    /// The session loop is spawned, so its future must be `Send` even when
    /// the transport is not `Sync`.
    #[tokio::test]
    async fn session_loop_is_send_with_a_non_sync_transport() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![]]);
        let mut connection = ConnectionManager::new(connector, ConnectionConfig::default());
        connection
            .open("ann", &LobbyCode::parse("ABCD").unwrap())
            .await
            .unwrap();
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, mut events) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let session = Session {
            connection,
            queue: PresentationQueue::new(),
            mapper: PhaseEventMapper::new(PresentationTimings::instant()),
            snapshot: Snapshot::default(),
            name: "ann".into(),
            lobby: LobbyCode::parse("ABCD").unwrap(),
            event_tx,
            state: Arc::new(ClientState {
                connected: AtomicBool::new(true),
                presenting: AtomicBool::new(false),
                lockout: Mutex::new(SubmitLockout::new(DEFAULT_SUBMIT_LOCKOUT)),
            }),
            pending_investigation: None,
            icon_prompt: None,
        };

        let session = session_loop(session, cmd_rx, shutdown_rx);
        assert_spawnable(&session);
        let task = tokio::spawn(session);
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            ClientEvent::Connected { .. }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            ClientEvent::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn failed_first_connect_is_an_error() {
        let (connector, _sent, _closed) = MockConnector::new(vec![]);
        let result = SecretHitlerClient::connect(connector, config()).await;
        assert!(matches!(result, Err(ClientError::TransportClosed)));
    }

    #[tokio::test]
    async fn submit_tags_command_with_name_and_lobby() {
        let (connector, sent, _closed) = MockConnector::new(vec![vec![]]);
        let (mut client, mut events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();
        next_event(&mut events).await;

        client
            .submit(Command::RegisterVote { vote: true })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: serde_json::Value = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert_eq!(last["command"], "register-vote");
            assert_eq!(last["vote"], true);
            assert_eq!(last["name"], "ann");
            assert_eq!(last["lobby"], "ABCD");
        }
        client.shutdown().await;
    }

    #[tokio::test]
    async fn second_action_inside_lockout_is_refused() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![]]);
        let (mut client, mut events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();
        next_event(&mut events).await;

        client.submit(Command::RegisterPeek).await.unwrap();
        let err = client.submit(Command::EndTerm).await.unwrap_err();
        assert!(matches!(err, ClientError::InputLocked { .. }));
        // Keep-alives and state requests are never locked.
        client.submit(Command::GetState).await.unwrap();
        assert!(client.lockout_remaining().await.is_some());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn nomination_prompt_finishes_on_ok() {
        let (connector, _sent, _closed) =
            MockConnector::new(vec![vec![Some(Ok(nomination_json("ann"))), Some(Ok(ok_json()))]]);
        let (mut client, mut events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();

        let prompt = wait_for(&mut events, |e| {
            matches!(
                e,
                ClientEvent::Present {
                    presentation: Presentation::NominationPrompt { .. },
                    ..
                }
            )
        })
        .await;
        let ClientEvent::Present { id, .. } = prompt else {
            unreachable!()
        };

        assert_eq!(next_event(&mut events).await, ClientEvent::Finished { id });
        assert!(matches!(
            next_event(&mut events).await,
            ClientEvent::Present {
                presentation: Presentation::DeckUpdate { .. },
                ..
            }
        ));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_snapshot_keeps_session_alive() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![
            Some(Ok(r#"{"type":"game","state":"LEGISLATIVE_PRESIDENT"}"#.into())),
            Some(Ok("not json".into())),
        ]]);
        let (mut client, mut events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();
        next_event(&mut events).await;

        assert!(matches!(
            next_event(&mut events).await,
            ClientEvent::ProtocolError { .. }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            ClientEvent::ProtocolError { .. }
        ));
        assert!(client.is_connected());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn spent_reconnect_budget_ends_the_session() {
        // Only the first connect succeeds; the link drops at once.
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![None]]);
        let (mut client, mut events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();

        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }
        let notices = collected
            .iter()
            .filter(|e| matches!(e, ClientEvent::Notice(_)))
            .count();
        assert_eq!(notices, 2);
        assert_eq!(
            collected.last(),
            Some(&ClientEvent::Disconnected {
                message: Some(TERMINAL_NOTICE.into())
            })
        );
        assert!(!client.is_connected());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected_and_closes() {
        let (connector, _sent, closed) = MockConnector::new(vec![vec![]]);
        let (mut client, mut events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();
        next_event(&mut events).await;

        client.shutdown().await;
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::Disconnected {
                message: Some("client shut down".into())
            }
        );
        assert!(closed.load(Ordering::Relaxed));
        assert!(matches!(
            client.submit(Command::GetState).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![]]);
        let (mut client, _events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();
        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![]]);
        let (client, mut events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();
        next_event(&mut events).await;
        drop(client);
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![]]);
        let (mut client, _events) = SecretHitlerClient::connect(connector, config())
            .await
            .unwrap();
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("SecretHitlerClient"));
        assert!(debug_str.contains("ABCD"));
        client.shutdown().await;
    }

    #[test]
    fn config_defaults() {
        let config = ClientConfig::new("ann", LobbyCode::parse("ABCD").unwrap());
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.submit_lockout, Duration::from_secs(4));
        assert_eq!(config.timings, PresentationTimings::default());
        assert_eq!(config.connection, ConnectionConfig::default());
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = config().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }
}

//! Async remote-control client with a self-healing connection lifecycle.
//!
//! [`RemoteClient`] is a thin handle. [`RemoteClient::start`] spawns a
//! background connection task that owns the transport session, the
//! [`StateMachine`], the heartbeat monitor, the listener registry and both
//! timers. The handle talks to it over an unbounded command channel, and the
//! task publishes every status change on a [`watch`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = RemoteConfig::new("http://192.168.0.4:3000/");
//! let mut client = RemoteClient::new(WebSocketConnector::new(), config);
//! client.on("volumeChanged", |args| println!("volume: {args:?}"))?;
//! client.start()?;
//!
//! let mut status = client.watch_status();
//! while status.changed().await.is_ok() {
//!     println!("status: {}", *status.borrow());
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{RemoteError, Result};
use crate::heartbeat::{HeartbeatMonitor, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};
use crate::hydrate::hydrate;
use crate::machine::{Effect, StateMachine, Trigger, DEFAULT_GRACE_PERIOD};
use crate::protocol::{ClientCommand, PING};
use crate::registry::{EventHandler, ListenerRegistry, SessionId};
use crate::status::ConnectionStatus;
use crate::timer::{Deadline, Ticker};
use crate::transport::{Connector, Session, SessionEvent, TransportConfig, DEFAULT_SERVER_URL};

/// Default timeout for the graceful shutdown and for closing a session.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Shortest heartbeat poll interval accepted (tokio rejects a zero period).
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`RemoteClient`].
///
/// # Example
///
/// ```
/// use playback_remote::client::RemoteConfig;
/// use std::time::Duration;
///
/// let config = RemoteConfig::new("http://10.0.0.2:3000/")
///     .with_grace_period(Duration::from_secs(5))
///     .with_heartbeat_timeout(Duration::from_secs(30));
/// assert_eq!(config.grace_period, Duration::from_secs(5));
/// assert_eq!(config.heartbeat_timeout, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Parameters handed to the [`Connector`] for every new session.
    pub transport: TransportConfig,
    /// Name of the server's liveness pulse. Defaults to `"ping"`.
    pub heartbeat_event: String,
    /// How often the heartbeat is checked. Defaults to **15 seconds**.
    pub heartbeat_interval: Duration,
    /// Silence after which a connected link is presumed dead.
    ///
    /// Defaults to **45 seconds**. `None` disables heartbeat checking, leaving
    /// transport disconnect events as the only loss signal.
    pub heartbeat_timeout: Option<Duration>,
    /// Window a lost link gets to heal before it is reported as
    /// [`ConnectionStatus::Disconnected`]. Defaults to **3 seconds**.
    pub grace_period: Duration,
    /// Bound on the graceful shutdown and on closing a session.
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl RemoteConfig {
    /// Create a configuration for the given server URL with default values.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            transport: TransportConfig {
                url: url.into(),
                ..TransportConfig::default()
            },
            heartbeat_event: PING.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: Some(DEFAULT_HEARTBEAT_TIMEOUT),
            grace_period: DEFAULT_GRACE_PERIOD,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the request path of the event endpoint.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.transport.path = path.into();
        self
    }

    /// Set the bound on a single connection attempt.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.transport.connect_timeout = timeout;
        self
    }

    /// Set the pause between the transport's own reconnection attempts.
    #[must_use]
    pub fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.transport.reconnection_delay = delay;
        self
    }

    /// Set the name of the liveness pulse event.
    #[must_use]
    pub fn with_heartbeat_event(mut self, event: impl Into<String>) -> Self {
        self.heartbeat_event = event.into();
        self
    }

    /// Set the heartbeat poll interval. Values below 1 ms are clamped.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        self
    }

    /// Set the heartbeat silence threshold.
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }

    /// Disable heartbeat checking.
    #[must_use]
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_timeout = None;
        self
    }

    /// Set the grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the graceful shutdown timeout. A zero timeout aborts the
    /// connection task immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Requests from the handle to the connection task.
enum Command {
    Reconnect,
    Emit { event: String, args: Vec<Value> },
    Subscribe { event: String, handler: EventHandler },
}

/// Everything the connection task needs, parked until [`RemoteClient::start`].
struct Idle {
    connector: Box<dyn Connector>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<ConnectionStatus>,
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a remote-control connection.
///
/// Constructed explicitly with [`RemoteClient::new`]; nothing connects until
/// [`start`](Self::start) is called. Commands issued before `start` are queued
/// and run once the connection task is up.
pub struct RemoteClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ConnectionStatus>,
    idle: Option<Idle>,
    config: RemoteConfig,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shut_down: bool,
}

impl RemoteClient {
    /// Create a client that will open sessions through `connector`.
    pub fn new(connector: impl Connector, config: RemoteConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            cmd_tx,
            status_rx,
            idle: Some(Idle {
                connector: Box::new(connector),
                cmd_rx,
                status_tx,
            }),
            config,
            task: None,
            shutdown_tx: None,
            shut_down: false,
        }
    }

    /// Spawn the connection task and open the first session.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ShutDown`] after [`shutdown`](Self::shutdown);
    /// a new client is required to connect again.
    pub fn start(&mut self) -> Result<()> {
        if self.shut_down {
            return Err(RemoteError::ShutDown);
        }
        let Some(idle) = self.idle.take() else {
            debug!("RemoteClient: already started");
            return Ok(());
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = ConnectionTask::new(idle.connector, self.config.clone(), idle.status_tx);
        self.task = Some(tokio::spawn(task.run(idle.cmd_rx, shutdown_rx)));
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Discard the current session and open a fresh one.
    ///
    /// Accepted from every status, including `Error`. The grace window, if
    /// any, is void; the heartbeat poll resumes once the new session connects.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ShutDown`] after shutdown, or
    /// [`RemoteError::NotRunning`] if the connection task has gone away.
    pub fn reconnect(&self) -> Result<()> {
        self.send(Command::Reconnect)
    }

    /// Send a typed command to the server.
    ///
    /// Commands issued while no session exists are dropped by the
    /// connection task.
    ///
    /// # Errors
    ///
    /// See [`reconnect`](Self::reconnect).
    pub fn emit(&self, command: ClientCommand) -> Result<()> {
        self.emit_raw(command.name(), command.args())
    }

    /// Send an arbitrary named event to the server.
    ///
    /// # Errors
    ///
    /// See [`reconnect`](Self::reconnect).
    pub fn emit_raw(&self, event: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.send(Command::Emit {
            event: event.into(),
            args,
        })
    }

    /// Register a handler for a server event.
    ///
    /// The handler stays registered across reconnects and is bound exactly
    /// once to every session. It runs on the connection task, so it should
    /// return quickly.
    ///
    /// # Errors
    ///
    /// See [`reconnect`](Self::reconnect).
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.send(Command::Subscribe {
            event: event.into(),
            handler: Arc::new(handler),
        })
    }

    /// Shut down the client: cancel both timers, close the session and stop
    /// the connection task. The client cannot be restarted afterwards.
    pub async fn shutdown(&mut self) {
        debug!("RemoteClient: shutdown requested");
        self.shut_down = true;
        self.idle = None;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the connection task with a timeout. If it doesn't exit in
        // time, abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection task aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// The current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// A receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Returns `true` while the connection task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, command: Command) -> Result<()> {
        if self.shut_down {
            return Err(RemoteError::ShutDown);
        }
        self.cmd_tx
            .send(command)
            .map_err(|_| RemoteError::NotRunning)
    }
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("status", &*self.status_rx.borrow())
            .field("started", &self.idle.is_none())
            .field("has_task", &self.task.is_some())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

impl Drop for RemoteClient {
    fn drop(&mut self) {
        // `Drop` is synchronous, so the graceful path (which awaits
        // `Session::close`) is unavailable. Aborting drops the task future
        // and with it the session.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection task ─────────────────────────────────────────────────

struct ActiveSession {
    id: SessionId,
    inner: Box<dyn Session>,
}

/// Sole owner of the connection state. Every status change and every timer
/// arm/cancel happens on this task, one trigger at a time.
struct ConnectionTask {
    connector: Box<dyn Connector>,
    config: RemoteConfig,
    machine: StateMachine,
    heartbeat: HeartbeatMonitor,
    heartbeat_ticker: Ticker,
    grace: Deadline,
    registry: ListenerRegistry,
    session: Option<ActiveSession>,
    sessions_opened: u64,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl ConnectionTask {
    fn new(
        connector: Box<dyn Connector>,
        config: RemoteConfig,
        status_tx: watch::Sender<ConnectionStatus>,
    ) -> Self {
        let mut registry = ListenerRegistry::new();
        // The pulse is recorded by the task itself; the no-op listener only
        // makes the registry subscribe it on every session.
        registry.subscribe(config.heartbeat_event.clone(), Arc::new(|_: &[Value]| {}));

        Self {
            connector,
            machine: StateMachine::new(config.grace_period),
            heartbeat: HeartbeatMonitor::new(
                config.heartbeat_timeout.unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT),
            ),
            heartbeat_ticker: Ticker::new(),
            grace: Deadline::new(),
            registry,
            session: None,
            sessions_opened: 0,
            status_tx,
            config,
        }
    }

    /// Exits when:
    /// - the shutdown signal fires (or the handle was dropped)
    /// - the command channel closes
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("connection task started");
        self.apply(Trigger::Start).await;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    break;
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        debug!("command channel closed, shutting down connection task");
                        break;
                    }
                },

                event = next_session_event(&mut self.session) => {
                    self.handle_session_event(event).await;
                }

                () = self.grace.expired() => {
                    debug!("grace period elapsed");
                    self.apply(Trigger::GraceExpired).await;
                }

                () = self.heartbeat_ticker.tick() => self.check_heartbeat().await,
            }
        }

        self.apply(Trigger::Shutdown).await;
        debug!(
            grace_armed = self.grace.is_armed(),
            heartbeat_running = self.heartbeat_ticker.is_running(),
            "connection task exited"
        );
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Reconnect => {
                info!("reconnect requested");
                self.apply(Trigger::Reconnect).await;
            }
            Command::Emit { event, args } => match self.session.as_mut() {
                Some(active) => {
                    if let Err(e) = active.inner.emit(&event, args).await {
                        warn!(session = %active.id, event = %event, "emit failed: {e}");
                    }
                }
                None => debug!(event = %event, "no session, dropping outgoing event"),
            },
            Command::Subscribe { event, handler } => {
                self.registry.subscribe(event, handler);
                if let Some(active) = self.session.as_mut() {
                    self.registry.reattach_all(active.id, active.inner.as_mut());
                }
            }
        }
    }

    async fn handle_session_event(&mut self, event: Option<SessionEvent>) {
        let Some(id) = self.session.as_ref().map(|active| active.id) else {
            return;
        };

        match event {
            Some(SessionEvent::Connected) => {
                info!(session = %id, "transport connected");
                self.apply(Trigger::SessionConnected).await;
            }
            Some(SessionEvent::ConnectError(detail)) => {
                warn!(session = %id, detail = %detail, "transport connect error");
                self.apply(Trigger::ConnectFailed { detail }).await;
            }
            Some(SessionEvent::Disconnected { reason }) => {
                warn!(session = %id, reason = ?reason, "transport disconnected");
                self.apply(Trigger::LinkLost).await;
            }
            Some(SessionEvent::Message { event, args }) => {
                if event == self.config.heartbeat_event {
                    self.heartbeat.record(Instant::now());
                }
                self.registry.dispatch(id, &event, &args);
            }
            None => {
                warn!(session = %id, "transport session ended");
                self.session = None;
                self.apply(Trigger::LinkLost).await;
            }
        }
    }

    async fn check_heartbeat(&mut self) {
        let now = Instant::now();
        if self.heartbeat.is_timed_out(self.machine.status(), now) {
            warn!(
                silent_for = ?now.saturating_duration_since(self.heartbeat.last_signal_at()),
                timeout = ?self.heartbeat.timeout(),
                "heartbeat timed out"
            );
            self.apply(Trigger::HeartbeatExpired).await;
        }
    }

    /// Run `trigger` and any follow-up triggers produced by its effects,
    /// publishing the status after each transition's effects have run
    /// (before them for the terminal transition).
    async fn apply(&mut self, trigger: Trigger) {
        let mut queue = VecDeque::from([trigger]);
        while let Some(trigger) = queue.pop_front() {
            let transition = self.machine.apply(trigger, Instant::now());
            // A terminal status is published up front: closing a half-open
            // session may stall until the handle aborts this task.
            let publish_early = transition.changed && self.machine.is_terminated();
            if publish_early {
                self.status_tx.send_replace(self.machine.status().clone());
            }
            for effect in transition.effects {
                if let Some(follow_up) = self.run_effect(effect).await {
                    queue.push_back(follow_up);
                }
            }
            if transition.changed && !publish_early {
                self.status_tx.send_replace(self.machine.status().clone());
            }
        }
    }

    async fn run_effect(&mut self, effect: Effect) -> Option<Trigger> {
        match effect {
            Effect::CloseSession => self.close_session().await,
            Effect::OpenSession => return self.open_session(),
            Effect::ArmGrace(at) => self.grace.arm(at),
            Effect::CancelGrace => self.grace.cancel(),
            Effect::StartHeartbeat => {
                self.heartbeat.record(Instant::now());
                if self.config.heartbeat_timeout.is_some() {
                    self.heartbeat_ticker.start(self.config.heartbeat_interval);
                }
            }
            Effect::StopHeartbeat => self.heartbeat_ticker.stop(),
            Effect::Hydrate => {
                if let Some(active) = self.session.as_mut() {
                    hydrate(active.inner.as_mut()).await;
                }
            }
        }
        None
    }

    fn open_session(&mut self) -> Option<Trigger> {
        match self.connector.open(&self.config.transport) {
            Ok(mut inner) => {
                self.sessions_opened += 1;
                let id = SessionId(self.sessions_opened);
                self.registry.reattach_all(id, inner.as_mut());
                info!(session = %id, url = %self.config.transport.url, "session opened");
                self.session = Some(ActiveSession { id, inner });
                None
            }
            Err(e) => {
                error!("failed to open transport session: {e}");
                Some(Trigger::InitFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    async fn close_session(&mut self) {
        let Some(mut active) = self.session.take() else {
            return;
        };
        match tokio::time::timeout(self.config.shutdown_timeout, active.inner.close()).await {
            Ok(Ok(())) => debug!(session = %active.id, "session closed"),
            Ok(Err(e)) => warn!(session = %active.id, "session close failed: {e}"),
            Err(_) => warn!(session = %active.id, "session close timed out, dropping it"),
        }
    }
}

async fn next_session_event(session: &mut Option<ActiveSession>) -> Option<SessionEvent> {
    match session {
        Some(active) => active.inner.recv().await,
        None => std::future::pending().await,
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
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    // ── Mock connector ──────────────────────────────────────────────

    /// Hands out sessions whose inbound events come from a channel held by
    /// the test.
    #[derive(Clone, Default)]
    struct MockConnector {
        inject: Arc<StdMutex<Vec<mpsc::UnboundedSender<SessionEvent>>>>,
        emitted: Arc<StdMutex<Vec<String>>>,
        closed: Arc<StdMutex<Vec<Arc<AtomicBool>>>>,
        fail: Arc<AtomicBool>,
    }

    struct MockSession {
        rx: mpsc::UnboundedReceiver<SessionEvent>,
        emitted: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl Connector for MockConnector {
        fn open(&self, _config: &TransportConfig) -> Result<Box<dyn Session>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RemoteError::Init("bad options".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            self.inject.lock().unwrap().push(tx);
            self.closed.lock().unwrap().push(Arc::clone(&closed));
            Ok(Box::new(MockSession {
                rx,
                emitted: Arc::clone(&self.emitted),
                closed,
            }))
        }
    }

    #[async_trait]
    impl Session for MockSession {
        fn on(&mut self, _event: &str) {}

        async fn emit(&mut self, event: &str, _args: Vec<Value>) -> Result<()> {
            self.emitted.lock().unwrap().push(event.to_string());
            Ok(())
        }

        async fn recv(&mut self) -> Option<SessionEvent> {
            match self.rx.recv().await {
                Some(event) => Some(event),
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    impl MockConnector {
        async fn wait_for_sessions(&self, n: usize) {
            while self.inject.lock().unwrap().len() < n {
                tokio::task::yield_now().await;
            }
        }

        fn inject(&self, session: usize, event: SessionEvent) {
            self.inject.lock().unwrap()[session].send(event).unwrap();
        }
    }

    async fn wait_for(client: &RemoteClient, f: impl Fn(&ConnectionStatus) -> bool) {
        let mut rx = client.watch_status();
        rx.wait_for(|s| f(s)).await.unwrap();
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = RemoteConfig::default();
        assert_eq!(config.transport.url, "http://192.168.0.4:3000/");
        assert_eq!(config.transport.path, "/api/socket");
        assert_eq!(config.transport.connect_timeout, Duration::from_millis(45_000));
        assert_eq!(config.heartbeat_event, "ping");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.heartbeat_timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.grace_period, Duration::from_secs(3));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn config_builder_methods() {
        let config = RemoteConfig::new("http://h/")
            .with_path("/x")
            .with_connect_timeout(Duration::from_secs(5))
            .with_reconnection_delay(Duration::from_millis(200))
            .with_heartbeat_event("alive")
            .with_heartbeat_interval(Duration::ZERO)
            .without_heartbeat()
            .with_grace_period(Duration::from_secs(10));
        assert_eq!(config.transport.path, "/x");
        assert_eq!(config.transport.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.transport.reconnection_delay, Duration::from_millis(200));
        assert_eq!(config.heartbeat_event, "alive");
        assert_eq!(config.heartbeat_interval, MIN_HEARTBEAT_INTERVAL);
        assert!(config.heartbeat_timeout.is_none());
        assert_eq!(config.grace_period, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn new_client_is_idle_and_disconnected() {
        let client = RemoteClient::new(MockConnector::default(), RemoteConfig::default());
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn start_opens_a_session_and_reports_connecting() {
        let connector = MockConnector::default();
        let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
        client.start().unwrap();
        connector.wait_for_sessions(1).await;
        wait_for(&client, |s| *s == ConnectionStatus::Connecting).await;
        assert!(client.is_running());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn start_twice_opens_one_session() {
        let connector = MockConnector::default();
        let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
        client.start().unwrap();
        client.start().unwrap();
        wait_for(&client, |s| *s == ConnectionStatus::Connecting).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(connector.inject.lock().unwrap().len(), 1);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn init_failure_maps_to_error_status() {
        let connector = MockConnector::default();
        connector.fail.store(true, Ordering::SeqCst);
        let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
        client.start().unwrap();
        wait_for(&client, |s| matches!(s, ConnectionStatus::Error { .. })).await;
        if let ConnectionStatus::Error { message } = client.status() {
            assert!(message.contains("bad options"), "{message}");
        }

        // The fault is recoverable through reconnect.
        connector.fail.store(false, Ordering::SeqCst);
        client.reconnect().unwrap();
        connector.wait_for_sessions(1).await;
        wait_for(&client, |s| *s == ConnectionStatus::Connecting).await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn connect_success_hydrates_once() {
        let connector = MockConnector::default();
        let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
        client.start().unwrap();
        connector.wait_for_sessions(1).await;
        connector.inject(0, SessionEvent::Connected);
        wait_for(&client, ConnectionStatus::is_connected).await;

        assert_eq!(
            *connector.emitted.lock().unwrap(),
            vec!["getVolume", "getState", "getMute", "getCurrentSong"]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn emit_before_connect_reaches_the_session() {
        let connector = MockConnector::default();
        let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
        client.start().unwrap();
        client.emit(ClientCommand::ChangeVolume(30)).unwrap();
        connector.wait_for_sessions(1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*connector.emitted.lock().unwrap(), vec!["changeVolume"]);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_session_and_is_terminal() {
        let connector = MockConnector::default();
        let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
        client.start().unwrap();
        connector.wait_for_sessions(1).await;
        connector.inject(0, SessionEvent::Connected);
        wait_for(&client, ConnectionStatus::is_connected).await;

        client.shutdown().await;
        assert!(connector.closed.lock().unwrap()[0].load(Ordering::SeqCst));
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert!(client.is_shut_down());
        assert!(matches!(client.start(), Err(RemoteError::ShutDown)));
        assert!(matches!(client.reconnect(), Err(RemoteError::ShutDown)));
    }

    #[tokio::test]
    async fn shutdown_before_start_is_fine() {
        let mut client = RemoteClient::new(MockConnector::default(), RemoteConfig::default());
        client.shutdown().await;
        client.shutdown().await;
        assert!(matches!(client.start(), Err(RemoteError::ShutDown)));
    }

    /// Session whose `close()` hangs forever.
    struct HangingCloseConnector {
        dropped: Arc<AtomicBool>,
    }

    struct HangingCloseSession {
        dropped: Arc<AtomicBool>,
        announced: bool,
    }

    impl Drop for HangingCloseSession {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    impl Connector for HangingCloseConnector {
        fn open(&self, _config: &TransportConfig) -> Result<Box<dyn Session>> {
            Ok(Box::new(HangingCloseSession {
                dropped: Arc::clone(&self.dropped),
                announced: false,
            }))
        }
    }

    #[async_trait]
    impl Session for HangingCloseSession {
        fn on(&mut self, _event: &str) {}

        async fn emit(&mut self, _event: &str, _args: Vec<Value>) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<SessionEvent> {
            if !self.announced {
                self.announced = true;
                return Some(SessionEvent::Connected);
            }
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn hanging_session_close_does_not_block_shutdown() {
        let dropped = Arc::new(AtomicBool::new(false));
        let connector = HangingCloseConnector {
            dropped: Arc::clone(&dropped),
        };
        let config = RemoteConfig::default().with_shutdown_timeout(Duration::from_millis(20));
        let mut client = RemoteClient::new(connector, config);
        client.start().unwrap();
        wait_for(&client, |s| *s == ConnectionStatus::Connected).await;
        let watcher = client.watch_status();

        client.shutdown().await;
        assert!(
            dropped.load(Ordering::Acquire),
            "stuck session should be dropped once shutdown gives up on it"
        );
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert_eq!(*watcher.borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let client = RemoteClient::new(MockConnector::default(), RemoteConfig::default());
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("RemoteClient"));
        assert!(debug_str.contains("Disconnected"));
    }
}

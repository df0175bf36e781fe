#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for playback-remote integration tests.
//!
//! Provides a channel-based [`ScriptedConnector`] whose sessions are driven
//! by the test through [`SessionHandle`]s, plus helpers for awaiting status
//! changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use playback_remote::transport::{Connector, Session, SessionEvent, TransportConfig};
use playback_remote::{ConnectionStatus, RemoteClient, RemoteError};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

// ── ScriptedConnector ───────────────────────────────────────────────

/// Test-side view of one session handed out by [`ScriptedConnector`].
#[derive(Clone)]
pub struct SessionHandle {
    inject: mpsc::UnboundedSender<SessionEvent>,
    /// Every `(event, args)` the client emitted on this session.
    pub emitted: Arc<StdMutex<Vec<(String, Vec<Value>)>>>,
    /// Every event name passed to `on`, in call order.
    pub subscribed: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn send(&self, event: SessionEvent) {
        self.inject.send(event).unwrap();
    }

    pub fn connect(&self) {
        self.send(SessionEvent::Connected);
    }

    pub fn drop_link(&self) {
        self.send(SessionEvent::Disconnected {
            reason: Some("transport close".into()),
        });
    }

    pub fn message(&self, event: &str, args: Vec<Value>) {
        self.send(SessionEvent::Message {
            event: event.into(),
            args,
        });
    }

    pub fn emitted_names(&self) -> Vec<String> {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct Shared {
    sessions: StdMutex<Vec<SessionHandle>>,
    fail_next: StdMutex<Option<String>>,
    opened: watch::Sender<usize>,
}

/// A connector whose sessions never touch the network.
///
/// Lifecycle events and server messages are injected through the
/// [`SessionHandle`] of each session; everything the client does to a session
/// is recorded on the same handle.
#[derive(Clone)]
pub struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                sessions: StdMutex::new(Vec::new()),
                fail_next: StdMutex::new(None),
                opened: watch::Sender::new(0),
            }),
        }
    }

    /// Make the next `open` call fail with `message`.
    pub fn fail_next_open(&self, message: &str) {
        *self.shared.fail_next.lock().unwrap() = Some(message.into());
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> SessionHandle {
        self.shared.sessions.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> SessionHandle {
        self.shared.sessions.lock().unwrap().last().unwrap().clone()
    }

    /// Sessions that have been opened and not closed.
    pub fn live_sessions(&self) -> usize {
        self.shared
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !s.is_closed())
            .count()
    }

    /// Wait until at least `n` sessions have been opened and return the
    /// `n`-th.
    pub async fn wait_for_session(&self, n: usize) -> SessionHandle {
        let mut rx = self.shared.opened.subscribe();
        rx.wait_for(|opened| *opened >= n).await.unwrap();
        self.session(n - 1)
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, _config: &TransportConfig) -> Result<Box<dyn Session>, RemoteError> {
        if let Some(message) = self.shared.fail_next.lock().unwrap().take() {
            return Err(RemoteError::Init(message));
        }

        let (inject, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            inject,
            emitted: Arc::new(StdMutex::new(Vec::new())),
            subscribed: Arc::new(StdMutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let session = ScriptedSession {
            rx,
            handle: handle.clone(),
        };

        let mut sessions = self.shared.sessions.lock().unwrap();
        sessions.push(handle);
        self.shared.opened.send_replace(sessions.len());
        Ok(Box::new(session))
    }
}

struct ScriptedSession {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    handle: SessionHandle,
}

#[async_trait]
impl Session for ScriptedSession {
    fn on(&mut self, event: &str) {
        self.handle.subscribed.lock().unwrap().push(event.to_string());
    }

    async fn emit(&mut self, event: &str, args: Vec<Value>) -> Result<(), RemoteError> {
        if self.handle.is_closed() {
            return Err(RemoteError::TransportClosed);
        }
        self.handle
            .emitted
            .lock()
            .unwrap()
            .push((event.to_string(), args));
        Ok(())
    }

    async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        self.handle.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ── Status helpers ──────────────────────────────────────────────────

/// Wait until the client's status satisfies `f` and return it.
pub async fn wait_for_status(
    client: &RemoteClient,
    f: impl Fn(&ConnectionStatus) -> bool,
) -> ConnectionStatus {
    let mut rx = client.watch_status();
    let status = rx.wait_for(|s| f(s)).await.unwrap();
    status.clone()
}

/// Spawn a task recording every status the client publishes.
pub fn record_statuses(client: &RemoteClient) -> Arc<StdMutex<Vec<ConnectionStatus>>> {
    let seen = Arc::new(StdMutex::new(vec![client.status()]));
    let mut rx = client.watch_status();
    let sink = Arc::clone(&seen);
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            sink.lock().unwrap().push(status);
        }
    });
    seen
}

/// Let spawned tasks run without advancing the paused clock past any timer.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Assert that `actual` is `expected`, allowing for timer-wheel rounding.
pub fn assert_elapsed(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(10),
        "expected ~{expected:?}, got {actual:?}"
    );
}

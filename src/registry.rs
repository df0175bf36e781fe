//! Listener registry: domain event handlers that survive reconnects.
//!
//! Handlers are registered once by the caller and rebound to every new
//! session. Bindings are tracked per session identity, so rebinding on a
//! fresh session is routine while binding twice on the same session is a
//! no-op. When a session is replaced its bindings are simply forgotten.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::transport::Session;

/// A domain event handler. Receives the raw positional arguments; decoding is
/// up to the handler (see [`ServerEvent::decode`](crate::protocol::ServerEvent::decode)).
pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Identity of one session opened by the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Identity of one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    event: String,
    handler: EventHandler,
}

/// Tracks listeners and which of them are bound on the current session.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Listener>,
    next_id: u64,
    session: Option<SessionId>,
    bound: HashSet<ListenerId>,
    bound_events: HashSet<String>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. It is bound on the next
    /// [`reattach_all`](Self::reattach_all).
    pub fn subscribe(&mut self, event: impl Into<String>, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push(Listener {
            id,
            event: event.into(),
            handler,
        });
        id
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// The session the current bindings belong to.
    pub fn bound_session(&self) -> Option<SessionId> {
        self.session
    }

    /// Bind every listener not yet bound on `session`.
    ///
    /// Switching to a different session id discards all previous bindings.
    /// [`Session::on`] is called at most once per event name per session.
    /// Returns how many listeners were newly bound.
    pub fn reattach_all(&mut self, id: SessionId, session: &mut dyn Session) -> usize {
        if self.session != Some(id) {
            self.session = Some(id);
            self.bound.clear();
            self.bound_events.clear();
        }

        let mut newly_bound = 0;
        for listener in &self.listeners {
            if !self.bound.insert(listener.id) {
                continue;
            }
            if self.bound_events.insert(listener.event.clone()) {
                session.on(&listener.event);
            }
            newly_bound += 1;
        }
        if newly_bound > 0 {
            debug!(session = %id, newly_bound, "listeners attached");
        }
        newly_bound
    }

    /// Invoke the handlers for `event` that are bound on `session`.
    ///
    /// Events from any other session are ignored. Returns the number of
    /// handlers invoked.
    pub fn dispatch(&self, session: SessionId, event: &str, args: &[Value]) -> usize {
        if self.session != Some(session) {
            debug!(%session, event, "dropping event from a stale session");
            return 0;
        }
        let mut invoked = 0;
        for listener in &self.listeners {
            if listener.event == event && self.bound.contains(&listener.id) {
                (listener.handler)(args);
                invoked += 1;
            }
        }
        invoked
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .field("session", &self.session)
            .field("bound", &self.bound.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::transport::SessionEvent;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every `on` call.
    #[derive(Default)]
    struct RecordingSession {
        subscribed: Vec<String>,
    }

    #[async_trait]
    impl Session for RecordingSession {
        fn on(&mut self, event: &str) {
            self.subscribed.push(event.to_string());
        }

        async fn emit(&mut self, _event: &str, _args: Vec<Value>) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<SessionEvent> {
            None
        }

        async fn close(&mut self) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn counting_handler() -> (EventHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let handler: EventHandler = Arc::new(move |_args: &[Value]| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    #[test]
    fn reattaching_on_the_same_session_binds_nothing_new() {
        let mut registry = ListenerRegistry::new();
        let (h, _) = counting_handler();
        registry.subscribe("volumeChanged", h);

        let mut session = RecordingSession::default();
        assert_eq!(registry.reattach_all(SessionId(1), &mut session), 1);
        assert_eq!(registry.reattach_all(SessionId(1), &mut session), 0);
        assert_eq!(session.subscribed, vec!["volumeChanged"]);
    }

    #[test]
    fn a_new_session_gets_every_listener_again() {
        let mut registry = ListenerRegistry::new();
        let (a, _) = counting_handler();
        let (b, _) = counting_handler();
        registry.subscribe("volumeChanged", a);
        registry.subscribe("stateChanged", b);

        let mut first = RecordingSession::default();
        registry.reattach_all(SessionId(1), &mut first);
        let mut second = RecordingSession::default();
        assert_eq!(registry.reattach_all(SessionId(2), &mut second), 2);
        assert_eq!(second.subscribed, vec!["volumeChanged", "stateChanged"]);
        assert_eq!(registry.bound_session(), Some(SessionId(2)));
    }

    #[test]
    fn two_handlers_share_one_transport_subscription() {
        let mut registry = ListenerRegistry::new();
        let (a, count_a) = counting_handler();
        let (b, count_b) = counting_handler();
        registry.subscribe("songChanged", a);
        registry.subscribe("songChanged", b);

        let mut session = RecordingSession::default();
        registry.reattach_all(SessionId(7), &mut session);
        assert_eq!(session.subscribed, vec!["songChanged"]);

        assert_eq!(registry.dispatch(SessionId(7), "songChanged", &[json!("x")]), 2);
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeated_reconnects_never_duplicate_handler_calls() {
        let mut registry = ListenerRegistry::new();
        let (h, count) = counting_handler();
        registry.subscribe("muteChanged", h);

        for id in 0..5 {
            let mut session = RecordingSession::default();
            registry.reattach_all(SessionId(id), &mut session);
            registry.reattach_all(SessionId(id), &mut session);
        }
        registry.dispatch(SessionId(4), "muteChanged", &[json!(1)]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_from_stale_sessions_are_dropped() {
        let mut registry = ListenerRegistry::new();
        let (h, count) = counting_handler();
        registry.subscribe("stateChanged", h);

        let mut old = RecordingSession::default();
        registry.reattach_all(SessionId(1), &mut old);
        let mut new = RecordingSession::default();
        registry.reattach_all(SessionId(2), &mut new);

        assert_eq!(registry.dispatch(SessionId(1), "stateChanged", &[json!(1)]), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn late_subscription_binds_on_next_reattach() {
        let mut registry = ListenerRegistry::new();
        let mut session = RecordingSession::default();
        registry.reattach_all(SessionId(3), &mut session);

        let (h, count) = counting_handler();
        registry.subscribe("volumeChanged", h);
        assert_eq!(registry.dispatch(SessionId(3), "volumeChanged", &[json!(5)]), 0);

        assert_eq!(registry.reattach_all(SessionId(3), &mut session), 1);
        assert_eq!(registry.dispatch(SessionId(3), "volumeChanged", &[json!(5)]), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

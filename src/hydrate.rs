//! State hydration after every (re)connection.
//!
//! Updates pushed while the link was down are lost, so on entering
//! `Connected` the client asks for a full snapshot. Replies come back as the
//! ordinary `*Changed` events; nothing here waits for them.

use tracing::{debug, warn};

use crate::protocol::ClientCommand;
use crate::transport::Session;

/// The snapshot requests, in the order they are sent.
pub const HYDRATION_REQUESTS: [ClientCommand; 4] = [
    ClientCommand::GetVolume,
    ClientCommand::GetState,
    ClientCommand::GetMute,
    ClientCommand::GetCurrentSong,
];

/// Fire every hydration request on `session`.
///
/// Send failures are logged and skipped. Returns how many requests were
/// handed to the transport.
pub async fn hydrate(session: &mut dyn Session) -> usize {
    let mut sent = 0;
    for request in HYDRATION_REQUESTS {
        match session.emit(request.name(), request.args()).await {
            Ok(()) => sent += 1,
            Err(e) => warn!(request = request.name(), "hydration request failed: {e}"),
        }
    }
    debug!(sent, "hydration requested");
    sent
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
    use serde_json::Value;

    struct FlakySession {
        emitted: Vec<String>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Session for FlakySession {
        fn on(&mut self, _event: &str) {}

        async fn emit(&mut self, event: &str, args: Vec<Value>) -> Result<(), RemoteError> {
            assert!(args.is_empty());
            if self.fail_on == Some(event) {
                return Err(RemoteError::TransportSend("buffer full".into()));
            }
            self.emitted.push(event.to_string());
            Ok(())
        }

        async fn recv(&mut self) -> Option<SessionEvent> {
            None
        }

        async fn close(&mut self) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn requests_full_snapshot_in_order() {
        let mut session = FlakySession {
            emitted: Vec::new(),
            fail_on: None,
        };
        assert_eq!(hydrate(&mut session).await, 4);
        assert_eq!(
            session.emitted,
            vec!["getVolume", "getState", "getMute", "getCurrentSong"]
        );
    }

    #[tokio::test]
    async fn one_failed_request_does_not_stop_the_rest() {
        let mut session = FlakySession {
            emitted: Vec::new(),
            fail_on: Some("getState"),
        };
        assert_eq!(hydrate(&mut session).await, 3);
        assert_eq!(
            session.emitted,
            vec!["getVolume", "getMute", "getCurrentSong"]
        );
    }
}

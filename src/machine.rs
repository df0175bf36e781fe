//! Connection lifecycle state machine.
//!
//! [`StateMachine`] is pure: it owns the [`ConnectionStatus`] and, for every
//! [`Trigger`], decides the next status and the [`Effect`]s the connection
//! task must carry out (open or close a session, arm or cancel timers,
//! hydrate). It never performs I/O and never reads the clock; the caller
//! passes `now`. This keeps every transition deterministic and directly
//! testable.
//!
//! | From        | Trigger                         | To                         |
//! |-------------|---------------------------------|----------------------------|
//! | (init)      | `Start`                         | `Connecting`               |
//! | any         | `SessionConnected`              | `Connected`                |
//! | Connecting  | `ConnectFailed`                 | `Error` / `Disconnected`   |
//! | Connected   | `LinkLost` / `HeartbeatExpired` | `GracePeriod { since }`    |
//! | GracePeriod | `LinkLost` / `HeartbeatExpired` | unchanged                  |
//! | GracePeriod | `GraceExpired`                  | `Disconnected`             |
//! | any         | `Reconnect`                     | `Connecting`               |
//! | any         | `InitFailed`                    | `Error`                    |
//! | any         | `Shutdown`                      | `Disconnected` (terminal)  |

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::status::ConnectionStatus;

/// Default tolerance window before a lost link is reported.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// An input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// First activation by the caller.
    Start,
    /// The operator forces a fresh session.
    Reconnect,
    /// The current session reports its link is up.
    SessionConnected,
    /// The current session reports a failed connection attempt.
    ConnectFailed {
        /// Diagnostic from the transport; empty when it gave none.
        detail: String,
    },
    /// The current session reports its link dropped (or ended).
    LinkLost,
    /// The heartbeat poll found the link silent for too long.
    HeartbeatExpired,
    /// The grace deadline passed.
    GraceExpired,
    /// The transport could not be constructed.
    InitFailed {
        /// Description of the fault.
        message: String,
    },
    /// Final teardown.
    Shutdown,
}

/// A side effect requested by a transition, executed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Close and discard the current session, if any.
    CloseSession,
    /// Ask the connector for a new session and reattach listeners to it.
    OpenSession,
    /// Arm the grace deadline for the given instant.
    ArmGrace(Instant),
    /// Disarm the grace deadline.
    CancelGrace,
    /// Reset the heartbeat clock and (re)start the heartbeat poll.
    StartHeartbeat,
    /// Stop the heartbeat poll.
    StopHeartbeat,
    /// Request a full state snapshot from the server.
    Hydrate,
}

/// Result of applying one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transition {
    /// Whether the status changed.
    pub changed: bool,
    /// Effects to run, in order.
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged() -> Self {
        Self::default()
    }
}

/// The connection lifecycle state machine.
#[derive(Debug, Clone)]
pub struct StateMachine {
    status: ConnectionStatus,
    grace_period: Duration,
    started: bool,
    terminated: bool,
}

impl StateMachine {
    /// Create an idle machine in [`ConnectionStatus::Disconnected`].
    pub fn new(grace_period: Duration) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            grace_period,
            started: false,
            terminated: false,
        }
    }

    /// The current status.
    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Whether [`Trigger::Shutdown`] has been applied.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Apply `trigger` at time `now`.
    ///
    /// Once terminated, every trigger is ignored.
    pub fn apply(&mut self, trigger: Trigger, now: Instant) -> Transition {
        if self.terminated {
            debug!(?trigger, "ignoring trigger after shutdown");
            return Transition::unchanged();
        }

        match trigger {
            Trigger::Start => {
                if self.started {
                    return Transition::unchanged();
                }
                self.started = true;
                self.set(ConnectionStatus::Connecting, vec![Effect::OpenSession])
            }
            Trigger::Reconnect => {
                self.started = true;
                self.set(
                    ConnectionStatus::Connecting,
                    vec![
                        Effect::CancelGrace,
                        Effect::StopHeartbeat,
                        Effect::CloseSession,
                        Effect::OpenSession,
                    ],
                )
            }
            Trigger::SessionConnected => match self.status {
                ConnectionStatus::Connected => Transition::unchanged(),
                _ => self.set(
                    ConnectionStatus::Connected,
                    vec![Effect::CancelGrace, Effect::StartHeartbeat, Effect::Hydrate],
                ),
            },
            Trigger::ConnectFailed { detail } => match self.status {
                ConnectionStatus::Connecting => {
                    let next = if detail.is_empty() {
                        ConnectionStatus::Disconnected
                    } else {
                        ConnectionStatus::Error { message: detail }
                    };
                    self.set(next, Vec::new())
                }
                ConnectionStatus::Connected => self.enter_grace(now),
                _ => Transition::unchanged(),
            },
            Trigger::LinkLost => match self.status {
                ConnectionStatus::Connected => self.enter_grace(now),
                ConnectionStatus::Connecting => {
                    self.set(ConnectionStatus::Disconnected, Vec::new())
                }
                _ => Transition::unchanged(),
            },
            Trigger::HeartbeatExpired => match self.status {
                ConnectionStatus::Connected => self.enter_grace(now),
                _ => Transition::unchanged(),
            },
            Trigger::GraceExpired => match self.status {
                ConnectionStatus::GracePeriod { .. } => {
                    self.set(ConnectionStatus::Disconnected, Vec::new())
                }
                _ => Transition::unchanged(),
            },
            Trigger::InitFailed { message } => self.set(
                ConnectionStatus::Error { message },
                vec![Effect::CancelGrace, Effect::StopHeartbeat],
            ),
            Trigger::Shutdown => {
                self.terminated = true;
                self.set(
                    ConnectionStatus::Disconnected,
                    vec![
                        Effect::CancelGrace,
                        Effect::StopHeartbeat,
                        Effect::CloseSession,
                    ],
                )
            }
        }
    }

    /// Single entry point into `GracePeriod`, shared by link loss and
    /// heartbeat timeout. Callers only reach it from `Connected`, so a second
    /// signal while already in the window cannot restart it.
    fn enter_grace(&mut self, now: Instant) -> Transition {
        self.set(
            ConnectionStatus::GracePeriod { since: now },
            vec![Effect::ArmGrace(now + self.grace_period)],
        )
    }

    fn set(&mut self, next: ConnectionStatus, effects: Vec<Effect>) -> Transition {
        let changed = self.status != next;
        if changed {
            debug!(from = ?self.status, to = ?next, "connection status transition");
        }
        self.status = next;
        Transition { changed, effects }
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

    const GRACE: Duration = Duration::from_secs(3);

    fn connected(now: Instant) -> StateMachine {
        let mut machine = StateMachine::new(GRACE);
        machine.apply(Trigger::Start, now);
        machine.apply(Trigger::SessionConnected, now);
        assert_eq!(machine.status(), &ConnectionStatus::Connected);
        machine
    }

    fn in_grace(now: Instant) -> StateMachine {
        let mut machine = connected(now);
        machine.apply(Trigger::LinkLost, now);
        machine
    }

    fn failed(now: Instant) -> StateMachine {
        let mut machine = StateMachine::new(GRACE);
        machine.apply(Trigger::Start, now);
        machine.apply(
            Trigger::ConnectFailed {
                detail: "refused".into(),
            },
            now,
        );
        machine
    }

    #[test]
    fn starts_disconnected_and_start_opens_a_session() {
        let now = Instant::now();
        let mut machine = StateMachine::new(GRACE);
        assert_eq!(machine.status(), &ConnectionStatus::Disconnected);

        let t = machine.apply(Trigger::Start, now);
        assert!(t.changed);
        assert_eq!(t.effects, vec![Effect::OpenSession]);
        assert_eq!(machine.status(), &ConnectionStatus::Connecting);
    }

    #[test]
    fn second_start_is_ignored() {
        let now = Instant::now();
        let mut machine = StateMachine::new(GRACE);
        machine.apply(Trigger::Start, now);
        let t = machine.apply(Trigger::Start, now);
        assert_eq!(t, Transition::unchanged());
    }

    #[test]
    fn connect_success_hydrates_and_starts_heartbeat() {
        let now = Instant::now();
        let mut machine = StateMachine::new(GRACE);
        machine.apply(Trigger::Start, now);
        let t = machine.apply(Trigger::SessionConnected, now);
        assert!(t.changed);
        assert_eq!(
            t.effects,
            vec![Effect::CancelGrace, Effect::StartHeartbeat, Effect::Hydrate]
        );
    }

    #[test]
    fn repeated_connect_success_does_not_rehydrate() {
        let now = Instant::now();
        let mut machine = connected(now);
        let t = machine.apply(Trigger::SessionConnected, now);
        assert_eq!(t, Transition::unchanged());
        assert_eq!(machine.status(), &ConnectionStatus::Connected);
    }

    #[test]
    fn connect_failure_with_detail_is_an_error() {
        let now = Instant::now();
        let machine = failed(now);
        assert_eq!(
            machine.status(),
            &ConnectionStatus::Error {
                message: "refused".into()
            }
        );
    }

    #[test]
    fn connect_failure_without_detail_is_disconnected() {
        let now = Instant::now();
        let mut machine = StateMachine::new(GRACE);
        machine.apply(Trigger::Start, now);
        machine.apply(
            Trigger::ConnectFailed {
                detail: String::new(),
            },
            now,
        );
        assert_eq!(machine.status(), &ConnectionStatus::Disconnected);
    }

    #[test]
    fn link_loss_enters_grace_and_arms_deadline() {
        let now = Instant::now();
        let mut machine = connected(now);
        let later = now + Duration::from_secs(10);
        let t = machine.apply(Trigger::LinkLost, later);
        assert_eq!(
            machine.status(),
            &ConnectionStatus::GracePeriod { since: later }
        );
        assert_eq!(t.effects, vec![Effect::ArmGrace(later + GRACE)]);
    }

    #[test]
    fn heartbeat_timeout_shares_the_grace_transition() {
        let now = Instant::now();
        let mut machine = connected(now);
        let t = machine.apply(Trigger::HeartbeatExpired, now);
        assert_eq!(machine.status(), &ConnectionStatus::GracePeriod { since: now });
        assert_eq!(t.effects, vec![Effect::ArmGrace(now + GRACE)]);
    }

    #[test]
    fn repeated_loss_signals_never_restart_the_window() {
        let start = Instant::now();
        let mut machine = in_grace(start);
        for (i, trigger) in [
            Trigger::LinkLost,
            Trigger::HeartbeatExpired,
            Trigger::LinkLost,
            Trigger::ConnectFailed {
                detail: "again".into(),
            },
        ]
        .into_iter()
        .enumerate()
        {
            let at = start + Duration::from_millis(500 * (i as u64 + 1));
            let t = machine.apply(trigger, at);
            assert_eq!(t, Transition::unchanged());
            assert_eq!(machine.status(), &ConnectionStatus::GracePeriod { since: start });
        }
    }

    #[test]
    fn grace_expiry_disconnects_exactly_once() {
        let now = Instant::now();
        let mut machine = in_grace(now);
        let t = machine.apply(Trigger::GraceExpired, now + GRACE);
        assert!(t.changed);
        assert_eq!(machine.status(), &ConnectionStatus::Disconnected);

        let t = machine.apply(Trigger::GraceExpired, now + GRACE);
        assert!(!t.changed);
    }

    #[test]
    fn reconnect_within_grace_never_passes_through_disconnected() {
        let now = Instant::now();
        let mut machine = in_grace(now);
        let mut seen = vec![machine.status().clone()];

        let t = machine.apply(Trigger::SessionConnected, now + Duration::from_secs(2));
        seen.push(machine.status().clone());
        assert!(t.effects.contains(&Effect::CancelGrace));
        assert!(t.effects.contains(&Effect::Hydrate));

        // A stale expiry arriving afterwards must be ignored.
        machine.apply(Trigger::GraceExpired, now + GRACE);
        seen.push(machine.status().clone());

        assert!(!seen.contains(&ConnectionStatus::Disconnected), "{seen:?}");
        assert_eq!(machine.status(), &ConnectionStatus::Connected);
    }

    #[test]
    fn heartbeat_timeout_outside_connected_is_ignored() {
        let now = Instant::now();

        let mut idle = StateMachine::new(GRACE);
        assert_eq!(idle.apply(Trigger::HeartbeatExpired, now), Transition::unchanged());

        let mut connecting = StateMachine::new(GRACE);
        connecting.apply(Trigger::Start, now);
        assert_eq!(
            connecting.apply(Trigger::HeartbeatExpired, now),
            Transition::unchanged()
        );
        assert_eq!(connecting.status(), &ConnectionStatus::Connecting);

        let mut errored = failed(now);
        assert_eq!(
            errored.apply(Trigger::HeartbeatExpired, now),
            Transition::unchanged()
        );

        let mut grace = in_grace(now);
        assert_eq!(
            grace.apply(Trigger::HeartbeatExpired, now),
            Transition::unchanged()
        );
    }

    #[test]
    fn reconnect_is_accepted_from_every_state() {
        let now = Instant::now();
        let mut disconnected = in_grace(now);
        disconnected.apply(Trigger::GraceExpired, now + GRACE);

        let mut connecting = StateMachine::new(GRACE);
        connecting.apply(Trigger::Start, now);

        let machines = [
            StateMachine::new(GRACE),
            connecting,
            connected(now),
            in_grace(now),
            disconnected,
            failed(now),
        ];

        for mut machine in machines {
            let before = machine.status().clone();
            let t = machine.apply(Trigger::Reconnect, now);
            assert_eq!(machine.status(), &ConnectionStatus::Connecting, "from {before:?}");
            assert_eq!(
                t.effects,
                vec![
                    Effect::CancelGrace,
                    Effect::StopHeartbeat,
                    Effect::CloseSession,
                    Effect::OpenSession,
                ]
            );
        }
    }

    #[test]
    fn link_loss_while_connecting_is_disconnected() {
        let now = Instant::now();
        let mut machine = StateMachine::new(GRACE);
        machine.apply(Trigger::Start, now);
        machine.apply(Trigger::LinkLost, now);
        assert_eq!(machine.status(), &ConnectionStatus::Disconnected);
    }

    #[test]
    fn transport_healing_after_verdict_reconnects() {
        let now = Instant::now();
        let mut machine = in_grace(now);
        machine.apply(Trigger::GraceExpired, now + GRACE);
        let t = machine.apply(Trigger::SessionConnected, now + Duration::from_secs(10));
        assert!(t.changed);
        assert!(t.effects.contains(&Effect::Hydrate));
        assert_eq!(machine.status(), &ConnectionStatus::Connected);
    }

    #[test]
    fn init_failure_is_an_error() {
        let now = Instant::now();
        let mut machine = StateMachine::new(GRACE);
        machine.apply(Trigger::Start, now);
        machine.apply(
            Trigger::InitFailed {
                message: "bad url".into(),
            },
            now,
        );
        assert_eq!(
            machine.status(),
            &ConnectionStatus::Error {
                message: "bad url".into()
            }
        );
    }

    #[test]
    fn shutdown_is_terminal() {
        let now = Instant::now();
        let mut machine = in_grace(now);
        let t = machine.apply(Trigger::Shutdown, now);
        assert!(machine.is_terminated());
        assert_eq!(machine.status(), &ConnectionStatus::Disconnected);
        assert_eq!(
            t.effects,
            vec![
                Effect::CancelGrace,
                Effect::StopHeartbeat,
                Effect::CloseSession
            ]
        );

        for trigger in [
            Trigger::Start,
            Trigger::Reconnect,
            Trigger::SessionConnected,
            Trigger::Shutdown,
        ] {
            assert_eq!(machine.apply(trigger, now), Transition::unchanged());
            assert_eq!(machine.status(), &ConnectionStatus::Disconnected);
        }
    }
}

//! Feed connection state machine.
//!
//! `ConnectionManager` has no I/O. Every input goes through [`ConnectionManager::dispatch`],
//! which updates the state and returns the effects the session runtime must carry
//! out: open or tear down a transport, arm or cancel the attempt timer, start
//! the subscription dispatcher.
//!
//! ```text
//! CLOSED/FALLBACK --Connect--> CONNECTING --TransportUp--> OPEN
//!                               |  ^    \
//!        failure/timeout/down   |  |     `--3 attempts failed--> FALLBACK
//!                               `--'
//! OPEN --TransportDown--> CLOSED    any --Disconnect--> CLOSING --Released--> CLOSED
//! ```
use log::{debug, info, warn};
use watch_common::{ConnectionState, TransportMode};

/// Notice shown while in fallback mode.
pub const FALLBACK_NOTICE: &str =
    "Live prices are unavailable. Showing the last known quotes; use reconnect to try again.";

/// Inputs of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionInput {
    /// User or dispatcher asked for a connection.
    Connect,
    /// The transport of `attempt` confirmed the connection.
    TransportUp {
        /// Attempt id.
        attempt: u32,
    },
    /// The transport of `attempt` could not be established.
    AttemptFailed {
        /// Attempt id.
        attempt: u32,
        /// Human-readable reason.
        reason: String,
    },
    /// The bounded wait of `attempt` elapsed.
    AttemptTimedOut {
        /// Attempt id.
        attempt: u32,
    },
    /// The transport of `attempt` went away.
    TransportDown {
        /// Attempt id.
        attempt: u32,
        /// Human-readable reason.
        reason: String,
    },
    /// Explicit teardown.
    Disconnect,
    /// The runtime released the transport after a `Disconnect`.
    Released,
}

/// Work the runtime performs after a transition, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEffect {
    /// Release the live transport handle, if any.
    TearDown,
    /// Open a transport for `attempt` using `mode`.
    Open {
        /// Attempt id.
        attempt: u32,
        /// Transport strategy.
        mode: TransportMode,
    },
    /// Start the bounded wait of `attempt`.
    ArmTimeout {
        /// Attempt id.
        attempt: u32,
    },
    /// Cancel the pending attempt timer.
    CancelTimeout,
    /// Subscribe the full current catalog.
    SubscribeAll,
    /// Cancel pending subscription batches.
    CancelBatches,
    /// Live data stopped; mark active rows stale.
    MarkInactive,
}

/// Strategy of the `n`th attempt of a cycle (1-based).
pub fn strategy_for(n: u32) -> TransportMode {
    if n <= 1 {
        TransportMode::Streaming
    } else {
        TransportMode::Polling
    }
}

/// Connection lifecycle owner.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    max_attempts: u32,
    attempts_in_cycle: u32,
    next_attempt_id: u32,
    current_attempt: Option<u32>,
    current_mode: Option<TransportMode>,
    cycle_succeeded: bool,
    connected: bool,
    error: Option<String>,
    notice: Option<String>,
}

impl ConnectionManager {
    /// Closed manager allowing `max_attempts` attempts per cycle.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Closed,
            max_attempts: max_attempts.max(1),
            attempts_in_cycle: 0,
            next_attempt_id: 0,
            current_attempt: None,
            current_mode: None,
            cycle_succeeded: false,
            connected: false,
            error: None,
            notice: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `true` when the view should stop blocking on the connection.
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// User-visible error text.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Fallback notice, set only in `FALLBACK`.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Attempts made in the current cycle.
    pub fn attempts(&self) -> u32 {
        self.attempts_in_cycle
    }

    /// Id of the attempt in flight or the attempt that opened the feed.
    pub fn current_attempt(&self) -> Option<u32> {
        self.current_attempt
    }

    /// Mode of the current attempt.
    pub fn mode(&self) -> Option<TransportMode> {
        self.current_mode
    }

    /// `true` when `attempt` is the live one.
    pub fn is_current(&self, attempt: u32) -> bool {
        self.current_attempt == Some(attempt)
    }

    /// Records an error that did not come from the transport itself.
    pub fn report_error(&mut self, message: String) {
        self.error = Some(message);
    }

    /// Single entry point of the state machine.
    pub fn dispatch(&mut self, input: ConnectionInput) -> Vec<ConnectionEffect> {
        match input {
            ConnectionInput::Connect => self.on_connect(),
            ConnectionInput::TransportUp { attempt } => self.on_transport_up(attempt),
            ConnectionInput::AttemptFailed { attempt, reason } => self.on_attempt_failed(attempt, reason),
            ConnectionInput::AttemptTimedOut { attempt } => {
                self.on_attempt_failed(attempt, String::from("connection attempt timed out"))
            }
            ConnectionInput::TransportDown { attempt, reason } => self.on_transport_down(attempt, reason),
            ConnectionInput::Disconnect => self.on_disconnect(),
            ConnectionInput::Released => self.on_released(),
        }
    }

    fn on_connect(&mut self) -> Vec<ConnectionEffect> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                debug!("Connect ignored while {}", self.state);
                Vec::new()
            }
            _ => {
                self.attempts_in_cycle = 0;
                self.cycle_succeeded = false;
                self.connected = false;
                self.error = None;
                self.notice = None;
                self.start_attempt()
            }
        }
    }

    fn start_attempt(&mut self) -> Vec<ConnectionEffect> {
        if self.attempts_in_cycle >= self.max_attempts {
            return self.enter_fallback();
        }
        self.attempts_in_cycle += 1;
        self.next_attempt_id += 1;
        let attempt = self.next_attempt_id;
        let mode = strategy_for(self.attempts_in_cycle);
        self.current_attempt = Some(attempt);
        self.current_mode = Some(mode);
        self.state = ConnectionState::Connecting;
        info!(
            "Connection attempt {}/{} using {} transport",
            self.attempts_in_cycle, self.max_attempts, mode
        );
        vec![
            ConnectionEffect::CancelTimeout,
            ConnectionEffect::TearDown,
            ConnectionEffect::Open { attempt, mode },
            ConnectionEffect::ArmTimeout { attempt },
        ]
    }

    fn enter_fallback(&mut self) -> Vec<ConnectionEffect> {
        warn!(
            "All {} connection attempts failed, entering fallback mode",
            self.attempts_in_cycle
        );
        self.state = ConnectionState::Fallback;
        self.connected = true;
        self.error = None;
        self.notice = Some(String::from(FALLBACK_NOTICE));
        self.current_attempt = None;
        self.current_mode = None;
        vec![
            ConnectionEffect::CancelTimeout,
            ConnectionEffect::TearDown,
            ConnectionEffect::CancelBatches,
            ConnectionEffect::MarkInactive,
        ]
    }

    fn on_transport_up(&mut self, attempt: u32) -> Vec<ConnectionEffect> {
        if !self.is_current(attempt) || self.state != ConnectionState::Connecting {
            debug!("Ignoring stale confirmation from attempt {}", attempt);
            return Vec::new();
        }
        info!("Feed connected (attempt {})", attempt);
        self.state = ConnectionState::Open;
        self.cycle_succeeded = true;
        self.connected = true;
        self.error = None;
        self.notice = None;
        vec![ConnectionEffect::CancelTimeout, ConnectionEffect::SubscribeAll]
    }

    fn on_attempt_failed(&mut self, attempt: u32, reason: String) -> Vec<ConnectionEffect> {
        if !self.is_current(attempt) || self.state != ConnectionState::Connecting {
            debug!("Ignoring failure of stale attempt {}: {}", attempt, reason);
            return Vec::new();
        }
        warn!("Connection attempt {} failed: {}", attempt, reason);
        self.start_attempt()
    }

    fn on_transport_down(&mut self, attempt: u32, reason: String) -> Vec<ConnectionEffect> {
        if !self.is_current(attempt) {
            debug!("Ignoring disconnect of stale attempt {}: {}", attempt, reason);
            return Vec::new();
        }
        match self.state {
            ConnectionState::Connecting if !self.cycle_succeeded => {
                warn!("Transport dropped before confirmation: {}", reason);
                self.start_attempt()
            }
            ConnectionState::Open => {
                warn!("Feed disconnected: {}", reason);
                self.state = ConnectionState::Closed;
                self.connected = false;
                self.error = Some(format!("Disconnected: {}", reason));
                self.current_attempt = None;
                vec![
                    ConnectionEffect::CancelTimeout,
                    ConnectionEffect::TearDown,
                    ConnectionEffect::CancelBatches,
                    ConnectionEffect::MarkInactive,
                ]
            }
            _ => Vec::new(),
        }
    }

    fn on_disconnect(&mut self) -> Vec<ConnectionEffect> {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Closing) {
            return Vec::new();
        }
        info!("Disconnecting feed");
        self.state = ConnectionState::Closing;
        self.current_attempt = None;
        self.current_mode = None;
        self.connected = false;
        self.notice = None;
        vec![
            ConnectionEffect::CancelTimeout,
            ConnectionEffect::CancelBatches,
            ConnectionEffect::TearDown,
            ConnectionEffect::MarkInactive,
        ]
    }

    fn on_released(&mut self) -> Vec<ConnectionEffect> {
        if self.state == ConnectionState::Closing {
            self.state = ConnectionState::Closed;
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionEffect::*;

    fn opened(manager: &mut ConnectionManager) -> u32 {
        manager.dispatch(ConnectionInput::Connect);
        let attempt = manager.current_attempt().unwrap();
        manager.dispatch(ConnectionInput::TransportUp { attempt });
        attempt
    }

    #[test]
    fn connect_opens_preferred_mode_first() {
        let mut manager = ConnectionManager::new(3);
        let effects = manager.dispatch(ConnectionInput::Connect);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(
            effects,
            vec![
                CancelTimeout,
                TearDown,
                Open { attempt: 1, mode: TransportMode::Streaming },
                ArmTimeout { attempt: 1 },
            ]
        );
    }

    #[test]
    fn failures_walk_strategies_then_fall_back() {
        let mut manager = ConnectionManager::new(3);
        manager.dispatch(ConnectionInput::Connect);

        let second = manager.dispatch(ConnectionInput::AttemptTimedOut { attempt: 1 });
        assert!(second.contains(&Open { attempt: 2, mode: TransportMode::Polling }));

        let third = manager.dispatch(ConnectionInput::AttemptFailed {
            attempt: 2,
            reason: String::from("refused"),
        });
        assert!(third.contains(&Open { attempt: 3, mode: TransportMode::Polling }));

        let last = manager.dispatch(ConnectionInput::AttemptTimedOut { attempt: 3 });
        assert!(last.contains(&TearDown));
        assert_eq!(manager.state(), ConnectionState::Fallback);
        assert_eq!(manager.attempts(), 3);
        assert!(manager.connected());
        assert_eq!(manager.error(), None);
        assert_eq!(manager.notice(), Some(FALLBACK_NOTICE));
    }

    #[test]
    fn stale_events_are_ignored() {
        let mut manager = ConnectionManager::new(3);
        manager.dispatch(ConnectionInput::Connect);
        manager.dispatch(ConnectionInput::AttemptTimedOut { attempt: 1 });

        assert!(manager.dispatch(ConnectionInput::TransportUp { attempt: 1 }).is_empty());
        assert!(manager.dispatch(ConnectionInput::AttemptTimedOut { attempt: 1 }).is_empty());
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.current_attempt(), Some(2));
    }

    #[test]
    fn transport_up_subscribes_and_clears_error() {
        let mut manager = ConnectionManager::new(3);
        manager.dispatch(ConnectionInput::Connect);
        manager.report_error(String::from("old"));
        let effects = manager.dispatch(ConnectionInput::TransportUp { attempt: 1 });
        assert_eq!(effects, vec![CancelTimeout, SubscribeAll]);
        assert_eq!(manager.state(), ConnectionState::Open);
        assert!(manager.connected());
        assert_eq!(manager.error(), None);
    }

    #[test]
    fn drop_before_confirmation_chains_next_strategy() {
        let mut manager = ConnectionManager::new(3);
        manager.dispatch(ConnectionInput::Connect);
        let effects = manager.dispatch(ConnectionInput::TransportDown {
            attempt: 1,
            reason: String::from("reset"),
        });
        assert!(effects.contains(&Open { attempt: 2, mode: TransportMode::Polling }));
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn drop_after_open_waits_for_user() {
        let mut manager = ConnectionManager::new(3);
        let attempt = opened(&mut manager);
        let effects = manager.dispatch(ConnectionInput::TransportDown {
            attempt,
            reason: String::from("server closed connection"),
        });
        assert!(!effects.iter().any(|e| matches!(e, Open { .. })));
        assert!(effects.contains(&CancelBatches));
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(!manager.connected());
        assert_eq!(manager.error(), Some("Disconnected: server closed connection"));

        let reconnect = manager.dispatch(ConnectionInput::Connect);
        assert!(reconnect.contains(&Open { attempt: attempt + 1, mode: TransportMode::Streaming }));
        assert_eq!(manager.error(), None);
    }

    #[test]
    fn connect_is_ignored_while_busy() {
        let mut manager = ConnectionManager::new(3);
        manager.dispatch(ConnectionInput::Connect);
        assert!(manager.dispatch(ConnectionInput::Connect).is_empty());
        manager.dispatch(ConnectionInput::TransportUp { attempt: 1 });
        assert!(manager.dispatch(ConnectionInput::Connect).is_empty());
    }

    #[test]
    fn disconnect_releases_everything() {
        let mut manager = ConnectionManager::new(3);
        opened(&mut manager);
        let effects = manager.dispatch(ConnectionInput::Disconnect);
        assert_eq!(effects, vec![CancelTimeout, CancelBatches, TearDown, MarkInactive]);
        assert_eq!(manager.state(), ConnectionState::Closing);
        assert!(manager.dispatch(ConnectionInput::Disconnect).is_empty());
        manager.dispatch(ConnectionInput::Released);
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(manager.current_attempt(), None);
        assert!(manager.dispatch(ConnectionInput::Disconnect).is_empty());
    }

    #[test]
    fn fallback_can_reconnect() {
        let mut manager = ConnectionManager::new(1);
        manager.dispatch(ConnectionInput::Connect);
        manager.dispatch(ConnectionInput::AttemptTimedOut { attempt: 1 });
        assert_eq!(manager.state(), ConnectionState::Fallback);

        let effects = manager.dispatch(ConnectionInput::Connect);
        assert!(effects.contains(&Open { attempt: 2, mode: TransportMode::Streaming }));
        assert!(!manager.connected());
        assert_eq!(manager.notice(), None);
    }
}

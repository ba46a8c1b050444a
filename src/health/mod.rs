//! Push channel health tracking with self-healing.
//!
//! Transport errors are not surfaced immediately. The tracker first waits for
//! the channel to recover by itself, then asks the gateway for a pingback, and
//! only reports the first recorded error if that pingback never arrives. At
//! most one error is reported per healing cycle.
//!
//! The tracker is a pure state machine: [`HealthTracker::handle`] consumes an
//! event and returns the actions the connection must perform. Timers are
//! owned by the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use smallvec::{smallvec, SmallVec};

use crate::metrics::HealthMetrics;

/// Healing states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealState {
    /// No outstanding errors
    Idle,
    /// Errors recorded, waiting for the channel to recover by itself
    AwaitingHeal,
    /// Health check sent, waiting for the gateway's pingback
    AwaitingPingback,
}

impl HealState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealState::Idle => "idle",
            HealState::AwaitingHeal => "awaiting_heal",
            HealState::AwaitingPingback => "awaiting_pingback",
        }
    }
}

/// A transport error signal observed on the push channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelFault {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ChannelFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Inputs to the healing state machine
#[derive(Debug, Clone, PartialEq)]
pub enum HealEvent {
    /// The transport signalled an error
    Error(ChannelFault),
    /// The channel opened or a pingback arrived
    Recovered,
    HealTimerElapsed,
    PingbackTimerElapsed,
}

/// Actions requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum HealAction {
    ArmHealTimer,
    /// Send a health-check request scoped to the connection's dispatcher
    SendPing,
    ArmPingbackTimer,
    CancelTimers,
    /// Surface the error to the registered handler
    Report(ChannelFault),
}

pub type HealActions = SmallVec<[HealAction; 2]>;

#[derive(Debug)]
pub struct HealthTracker {
    state: HealState,
    errors: Vec<ChannelFault>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            state: HealState::Idle,
            errors: Vec::new(),
        }
    }

    pub fn state(&self) -> HealState {
        self.state
    }

    /// Errors recorded during the current healing cycle
    pub fn outstanding_errors(&self) -> usize {
        self.errors.len()
    }

    /// Apply an event and return the actions to perform
    pub fn handle(&mut self, event: HealEvent) -> HealActions {
        match (self.state, event) {
            (HealState::Idle, HealEvent::Error(fault)) => {
                HealthMetrics::record_error();
                tracing::debug!(error = %fault.message, "Channel error, waiting for it to heal");
                self.errors.push(fault);
                self.state = HealState::AwaitingHeal;
                smallvec![HealAction::ArmHealTimer]
            }
            (_, HealEvent::Error(fault)) => {
                // Coalesced into the running cycle; timers are left alone
                HealthMetrics::record_error();
                self.errors.push(fault);
                SmallVec::new()
            }
            (HealState::Idle, HealEvent::Recovered) => SmallVec::new(),
            (_, HealEvent::Recovered) => {
                HealthMetrics::record_healed();
                tracing::info!(errors = self.errors.len(), "Push channel healed");
                self.reset();
                smallvec![HealAction::CancelTimers]
            }
            (HealState::AwaitingHeal, HealEvent::HealTimerElapsed) => {
                if self.errors.is_empty() {
                    self.reset();
                    return SmallVec::new();
                }
                self.state = HealState::AwaitingPingback;
                tracing::debug!(errors = self.errors.len(), "Channel did not heal, requesting pingback");
                smallvec![HealAction::SendPing, HealAction::ArmPingbackTimer]
            }
            (HealState::AwaitingPingback, HealEvent::PingbackTimerElapsed) => {
                let first = self.errors.first().cloned();
                let total = self.errors.len();
                self.reset();
                match first {
                    Some(fault) => {
                        HealthMetrics::record_reported();
                        tracing::warn!(errors = total, error = %fault.message, "No pingback received, reporting channel error");
                        smallvec![HealAction::Report(fault)]
                    }
                    None => SmallVec::new(),
                }
            }
            // Stale timer for a state we already left
            (_, HealEvent::HealTimerElapsed) | (_, HealEvent::PingbackTimerElapsed) => {
                SmallVec::new()
            }
        }
    }

    /// Drop all healing state, e.g. on disconnect
    pub fn reset(&mut self) {
        self.state = HealState::Idle;
        self.errors.clear();
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one connection-check round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub status_code: u16,
    pub connect_error: bool,
    pub connect_error_count: u32,
}

/// Whether an HTTP status means the gateway could not be reached.
///
/// Status 0 is used for requests that produced no response at all.
pub fn is_unreachable(status_code: u16) -> bool {
    status_code < 100 || status_code >= 500
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(message: &str) -> HealEvent {
        HealEvent::Error(ChannelFault::new(message))
    }

    #[test]
    fn test_first_error_arms_heal_timer() {
        let mut tracker = HealthTracker::new();
        let actions = tracker.handle(fault("boom"));
        assert_eq!(actions.as_slice(), &[HealAction::ArmHealTimer]);
        assert_eq!(tracker.state(), HealState::AwaitingHeal);
    }

    #[test]
    fn test_recovery_before_heal_wait_reports_nothing() {
        let mut tracker = HealthTracker::new();
        tracker.handle(fault("boom"));
        let actions = tracker.handle(HealEvent::Recovered);
        assert_eq!(actions.as_slice(), &[HealAction::CancelTimers]);
        assert_eq!(tracker.state(), HealState::Idle);

        // A late timer is harmless
        assert!(tracker.handle(HealEvent::HealTimerElapsed).is_empty());
        assert_eq!(tracker.outstanding_errors(), 0);
    }

    #[test]
    fn test_further_errors_are_coalesced() {
        let mut tracker = HealthTracker::new();
        tracker.handle(fault("first"));
        assert!(tracker.handle(fault("second")).is_empty());

        let actions = tracker.handle(HealEvent::HealTimerElapsed);
        assert_eq!(
            actions.as_slice(),
            &[HealAction::SendPing, HealAction::ArmPingbackTimer]
        );
        assert!(tracker.handle(fault("third")).is_empty());
        assert_eq!(tracker.outstanding_errors(), 3);

        let actions = tracker.handle(HealEvent::PingbackTimerElapsed);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            HealAction::Report(reported) => assert_eq!(reported.message, "first"),
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(tracker.state(), HealState::Idle);
        assert!(tracker.handle(HealEvent::PingbackTimerElapsed).is_empty());
    }

    #[test]
    fn test_pingback_heals() {
        let mut tracker = HealthTracker::new();
        tracker.handle(fault("boom"));
        tracker.handle(HealEvent::HealTimerElapsed);
        assert_eq!(tracker.state(), HealState::AwaitingPingback);

        let actions = tracker.handle(HealEvent::Recovered);
        assert_eq!(actions.as_slice(), &[HealAction::CancelTimers]);
        assert!(tracker.handle(HealEvent::PingbackTimerElapsed).is_empty());
    }

    #[test]
    fn test_unreachable_range() {
        assert!(is_unreachable(0));
        assert!(is_unreachable(99));
        assert!(is_unreachable(500));
        assert!(is_unreachable(503));
        assert!(!is_unreachable(200));
        assert!(!is_unreachable(404));
    }
}

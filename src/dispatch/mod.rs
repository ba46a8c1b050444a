//! Per-channel listeners and event fan-out to matching subscriptions

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;

use crate::metrics::EventMetrics;
use crate::subscription::SubscriptionRegistry;

/// Run a caller-supplied callback, containing any panic it raises.
///
/// Returns `false` if the callback panicked.
pub(crate) fn invoke_guarded(kind: &'static str, callback: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            EventMetrics::record_callback_panic(kind);
            tracing::error!(kind = kind, panic = %message, "Callback panicked");
            false
        }
    }
}

/// Result of dispatching a single inbound event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    /// Subscriptions on the channel whose filter matched
    pub matched: usize,
    /// Matched callbacks that panicked
    pub failed: usize,
    /// Whether a listener was installed for the channel
    pub listened: bool,
}

/// Owns at most one listener per channel name.
///
/// Listeners requested while no push channel exists are queued and become
/// installed when the channel is established.
#[derive(Debug, Default)]
pub struct ChannelDispatcher {
    installed: BTreeSet<String>,
    queued: Vec<String>,
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a listener exists for `channel`.
    ///
    /// Returns `true` if a new listener was installed or queued.
    pub fn ensure_listener(&mut self, channel: &str, channel_live: bool) -> bool {
        if self.has_listener(channel) {
            return false;
        }

        if channel_live {
            self.installed.insert(channel.to_string());
            tracing::debug!(channel = %channel, "Channel listener installed");
        } else {
            self.queued.push(channel.to_string());
            tracing::debug!(channel = %channel, "Channel listener queued until the push channel opens");
        }
        true
    }

    /// Install every queued listener on a freshly established push channel
    pub fn install_queued(&mut self) -> usize {
        let queued = std::mem::take(&mut self.queued);
        let count = queued.len();
        self.installed.extend(queued);
        if count > 0 {
            tracing::debug!(count = count, "Replayed queued channel listeners");
        }
        count
    }

    pub fn has_listener(&self, channel: &str) -> bool {
        self.installed.contains(channel) || self.queued.iter().any(|c| c == channel)
    }

    pub fn is_installed(&self, channel: &str) -> bool {
        self.installed.contains(channel)
    }

    /// Names of all installed and queued listeners
    pub fn listener_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.installed.iter().cloned().collect();
        names.extend(self.queued.iter().cloned());
        names
    }

    /// Remove every listener, installed or queued
    pub fn clear(&mut self) {
        self.installed.clear();
        self.queued.clear();
    }

    /// Deliver an inbound event on `channel` to every matching subscription.
    ///
    /// The payload is deserialized once and each matching callback receives
    /// its own copy, so a callback mutating its value cannot affect siblings.
    /// Callbacks run in registration order; a panicking callback does not stop
    /// delivery to the rest.
    pub fn dispatch(
        &self,
        registry: &SubscriptionRegistry,
        channel: &str,
        data: &str,
    ) -> DispatchOutcome {
        EventMetrics::record_received();

        if !self.is_installed(channel) {
            tracing::debug!(channel = %channel, "Ignoring event for channel without a listener");
            return DispatchOutcome::default();
        }

        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Dropping undecodable channel event");
                return DispatchOutcome {
                    listened: true,
                    ..Default::default()
                };
            }
        };

        let mut outcome = DispatchOutcome {
            listened: true,
            ..Default::default()
        };

        for subscription in registry.for_channel(channel) {
            if !subscription.filter.matches(&event) {
                continue;
            }
            outcome.matched += 1;

            let payload = event.clone();
            if !invoke_guarded("subscriber", || subscription.subscriber.call(payload)) {
                outcome.failed += 1;
            }
        }

        if outcome.matched == 0 {
            EventMetrics::record_unmatched();
            tracing::warn!(
                channel = %channel,
                subscribers = registry.len(),
                "Event did not match any of the registered subscriptions"
            );
        } else {
            EventMetrics::record_delivered(outcome.matched as u64);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::subscription::{Subscriber, Subscription};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Subscriber, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (
            Subscriber::new(move |event| sink.lock().unwrap().push(event)),
            seen,
        )
    }

    #[test]
    fn test_one_listener_per_channel() {
        let mut dispatcher = ChannelDispatcher::new();
        assert!(dispatcher.ensure_listener("jobs", true));
        assert!(!dispatcher.ensure_listener("jobs", true));
        assert!(!dispatcher.ensure_listener("jobs", false));
        assert_eq!(dispatcher.listener_names(), vec!["jobs".to_string()]);
    }

    #[test]
    fn test_queued_listeners_are_replayed() {
        let mut dispatcher = ChannelDispatcher::new();
        dispatcher.ensure_listener("jobs", false);
        dispatcher.ensure_listener("pipeline", false);
        assert!(!dispatcher.is_installed("jobs"));

        assert_eq!(dispatcher.install_queued(), 2);
        assert!(dispatcher.is_installed("jobs"));
        assert!(dispatcher.is_installed("pipeline"));
        assert_eq!(dispatcher.install_queued(), 0);
    }

    #[test]
    fn test_dispatch_only_to_matching_filters() {
        let mut dispatcher = ChannelDispatcher::new();
        let mut registry = SubscriptionRegistry::new();
        let (done, done_seen) = recorder();
        let (failed, failed_seen) = recorder();

        registry.add(Subscription::new("jobs", Filter::new().with("status", "done"), done));
        registry.add(Subscription::new("jobs", Filter::new().with("status", "failed"), failed));
        dispatcher.ensure_listener("jobs", true);

        let outcome = dispatcher.dispatch(
            &registry,
            "jobs",
            r#"{"jenkins_channel":"jobs","status":"done","job":"x"}"#,
        );

        assert_eq!(outcome.matched, 1);
        assert_eq!(done_seen.lock().unwrap().len(), 1);
        assert_eq!(done_seen.lock().unwrap()[0]["job"], json!("x"));
        assert!(failed_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_callback_does_not_block_others() {
        let mut dispatcher = ChannelDispatcher::new();
        let mut registry = SubscriptionRegistry::new();
        let (after, after_seen) = recorder();

        registry.add(Subscription::new(
            "jobs",
            Filter::new(),
            Subscriber::new(|_| panic!("subscriber failure")),
        ));
        registry.add(Subscription::new("jobs", Filter::new(), after));
        dispatcher.ensure_listener("jobs", true);

        let outcome = dispatcher.dispatch(&registry, "jobs", r#"{"n":1}"#);
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(after_seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_callbacks_receive_independent_copies() {
        let mut dispatcher = ChannelDispatcher::new();
        let mut registry = SubscriptionRegistry::new();
        let (observer, seen) = recorder();

        registry.add(Subscription::new(
            "jobs",
            Filter::new(),
            Subscriber::new(|mut event| {
                event["status"] = json!("tampered");
            }),
        ));
        registry.add(Subscription::new("jobs", Filter::new(), observer));
        dispatcher.ensure_listener("jobs", true);

        dispatcher.dispatch(&registry, "jobs", r#"{"status":"done"}"#);
        assert_eq!(seen.lock().unwrap()[0]["status"], json!("done"));
    }

    #[test]
    fn test_events_without_listener_are_ignored() {
        let dispatcher = ChannelDispatcher::new();
        let mut registry = SubscriptionRegistry::new();
        let (cb, seen) = recorder();
        registry.add(Subscription::new("jobs", Filter::new(), cb));

        let outcome = dispatcher.dispatch(&registry, "jobs", r#"{}"#);
        assert!(!outcome.listened);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unmatched_and_undecodable_events() {
        let mut dispatcher = ChannelDispatcher::new();
        let registry = SubscriptionRegistry::new();
        dispatcher.ensure_listener("jobs", true);

        let outcome = dispatcher.dispatch(&registry, "jobs", r#"{"a":1}"#);
        assert_eq!(outcome.matched, 0);
        assert!(outcome.listened);

        let outcome = dispatcher.dispatch(&registry, "jobs", "{broken");
        assert_eq!(outcome.matched, 0);
    }
}

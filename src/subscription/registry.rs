//! Subscription records and the registry that owns them

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::filter::Filter;

/// Subscriber callback.
///
/// Identity is the callback allocation: clones of a `Subscriber` are the same
/// subscriber, two separately created subscribers never are, even when they
/// wrap identical closures.
#[derive(Clone)]
pub struct Subscriber(Arc<dyn Fn(Value) + Send + Sync>);

impl Subscriber {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Invoke the callback with an event payload
    pub fn call(&self, event: Value) {
        (self.0)(event)
    }

    pub fn same_as(&self, other: &Subscriber) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscriber({:p})", Arc::as_ptr(&self.0))
    }
}

/// A single active subscription
#[derive(Debug, Clone)]
pub struct Subscription {
    pub channel: String,
    /// Caller-supplied filter, used for event matching
    pub filter: Filter,
    pub subscriber: Subscriber,
    /// Configuration record sent to the gateway (filter plus channel name)
    pub config: Filter,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, filter: Filter, subscriber: Subscriber) -> Self {
        let channel = channel.into();
        let config = filter.with_channel(&channel);
        Self {
            channel,
            filter,
            subscriber,
            config,
        }
    }
}

/// Ordered list of active subscriptions
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        tracing::debug!(channel = %subscription.channel, "Subscription registered");
        self.subscriptions.push(subscription);
    }

    /// Remove every subscription registered with `subscriber`, returning them in registration order
    pub fn remove_by_subscriber(&mut self, subscriber: &Subscriber) -> Vec<Subscription> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.subscriptions)
            .into_iter()
            .partition(|s| s.subscriber.same_as(subscriber));
        self.subscriptions = kept;

        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), "Subscriptions removed");
        }
        removed
    }

    /// Subscriptions on `channel`, in registration order
    pub fn for_channel<'a>(&'a self, channel: &'a str) -> impl Iterator<Item = &'a Subscription> {
        self.subscriptions.iter().filter(move |s| s.channel == channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> Subscriber {
        Subscriber::new(|_| {})
    }

    #[test]
    fn test_subscriber_identity() {
        let a = noop();
        let b = noop();
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_subscription_config_includes_channel() {
        let sub = Subscription::new("jobs", Filter::new().with("status", "done"), noop());
        assert_eq!(
            serde_json::to_value(&sub.config).unwrap(),
            json!({"jenkins_channel": "jobs", "status": "done"})
        );
        assert_eq!(sub.filter.len(), 1);
    }

    #[test]
    fn test_remove_by_subscriber_removes_all_and_only_matching() {
        let mut registry = SubscriptionRegistry::new();
        let shared = noop();
        let other = noop();

        registry.add(Subscription::new("jobs", Filter::new(), shared.clone()));
        registry.add(Subscription::new("pipeline", Filter::new(), other.clone()));
        registry.add(Subscription::new("jobs", Filter::new().with("a", 1), shared.clone()));

        let removed = registry.remove_by_subscriber(&shared);
        assert_eq!(removed.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.iter().all(|s| s.subscriber.same_as(&other)));

        assert!(registry.remove_by_subscriber(&shared).is_empty());
    }

    #[test]
    fn test_for_channel_keeps_registration_order() {
        let mut registry = SubscriptionRegistry::new();
        registry.add(Subscription::new("jobs", Filter::new().with("n", 1), noop()));
        registry.add(Subscription::new("pipeline", Filter::new(), noop()));
        registry.add(Subscription::new("jobs", Filter::new().with("n", 2), noop()));

        let order: Vec<_> = registry
            .for_channel("jobs")
            .map(|s| s.filter.get("n").cloned().unwrap())
            .collect();
        assert_eq!(order, vec![json!(1), json!(2)]);
    }
}

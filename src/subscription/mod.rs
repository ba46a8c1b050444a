//! Subscription registry and configuration batching

mod batch;
mod registry;

pub use batch::{parse_batch_ack, BatchListener, ConfigBatch, ConfigBatcher, ConfigurePayload};
pub use registry::{Subscriber, Subscription, SubscriptionRegistry};

use crate::error::{ClientError, Result};
use crate::filter::Filter;

/// Options for a single `subscribe` call
#[derive(Default)]
pub struct SubscribeOptions {
    pub channel: Option<String>,
    pub filter: Option<Filter>,
    pub callback: Option<Subscriber>,
    pub on_subscribed: Option<BatchListener>,
}

impl SubscribeOptions {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Default::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn callback(mut self, callback: Subscriber) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Invoked once the gateway acknowledges the batch carrying this subscription
    pub fn on_subscribed<F>(mut self, listener: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_subscribed = Some(Box::new(listener));
        self
    }

    /// Check required arguments, producing the subscription and its optional listener
    pub fn into_subscription(self) -> Result<(Subscription, Option<BatchListener>)> {
        let channel = self
            .channel
            .filter(|c| !c.is_empty())
            .ok_or(ClientError::MissingArgument("channel"))?;
        let callback = self.callback.ok_or(ClientError::MissingArgument("callback"))?;

        let subscription = Subscription::new(channel, self.filter.unwrap_or_default(), callback);
        Ok((subscription, self.on_subscribed))
    }
}

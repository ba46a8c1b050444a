//! Debounced configuration batches and their completion listeners

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::filter::Filter;

/// Zero-argument completion callback, fired when a batch is acknowledged
pub type BatchListener = Box<dyn FnOnce() + Send>;

/// A set of subscribe/unsubscribe operations sent as one configuration request
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigBatch {
    pub batch_id: u64,
    pub subscribe: Vec<Filter>,
    pub unsubscribe: Vec<Filter>,
}

impl ConfigBatch {
    fn new(batch_id: u64) -> Self {
        Self {
            batch_id,
            subscribe: Vec::new(),
            unsubscribe: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// Body of a configuration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurePayload {
    pub subscribe: Vec<Filter>,
    pub unsubscribe: Vec<Filter>,
    #[serde(rename = "dispatcherId")]
    pub dispatcher_id: String,
}

/// Accumulates configuration operations and tracks per-batch listeners.
///
/// Exactly one batch is current at any time. Sending a batch freezes it and
/// replaces it with an empty batch carrying the next id.
pub struct ConfigBatcher {
    current: ConfigBatch,
    last_sent: Option<ConfigBatch>,
    listeners: HashMap<u64, SmallVec<[BatchListener; 2]>>,
}

impl ConfigBatcher {
    pub fn new() -> Self {
        Self {
            current: ConfigBatch::new(1),
            last_sent: None,
            listeners: HashMap::new(),
        }
    }

    /// Id of the batch currently accepting operations
    pub fn current_batch_id(&self) -> u64 {
        self.current.batch_id
    }

    pub fn current(&self) -> &ConfigBatch {
        &self.current
    }

    /// The most recently sent batch, if any
    pub fn last_sent(&self) -> Option<&ConfigBatch> {
        self.last_sent.as_ref()
    }

    pub fn queue_subscribe(&mut self, record: Filter) {
        self.current.subscribe.push(record);
    }

    pub fn queue_unsubscribe(&mut self, record: Filter) {
        self.current.unsubscribe.push(record);
    }

    pub fn has_pending(&self) -> bool {
        !self.current.is_empty()
    }

    /// Register a completion listener against the current (not yet sent) batch
    pub fn on_batch_complete(&mut self, listener: BatchListener) -> u64 {
        let batch_id = self.current.batch_id;
        self.listeners.entry(batch_id).or_default().push(listener);
        batch_id
    }

    /// Freeze the current batch into a request payload and rotate to a fresh batch.
    ///
    /// Returns `None` when there is nothing to send; the current batch is kept.
    pub fn take_batch(&mut self, dispatcher_id: &str) -> Option<(u64, ConfigurePayload)> {
        if !self.has_pending() {
            return None;
        }

        let next = ConfigBatch::new(self.current.batch_id + 1);
        let sent = std::mem::replace(&mut self.current, next);
        let payload = ConfigurePayload {
            subscribe: sent.subscribe.clone(),
            unsubscribe: sent.unsubscribe.clone(),
            dispatcher_id: dispatcher_id.to_string(),
        };
        let batch_id = sent.batch_id;
        self.last_sent = Some(sent);

        Some((batch_id, payload))
    }

    /// Drop unsent operations, keeping the batch id and its listeners
    pub fn discard_pending(&mut self) {
        self.current.subscribe.clear();
        self.current.unsubscribe.clear();
    }

    /// Drop listeners of batches that were sent but never acknowledged.
    ///
    /// Returns the number of batches whose listeners were dropped.
    pub fn drop_unacknowledged(&mut self) -> usize {
        let current = self.current.batch_id;
        let before = self.listeners.len();
        self.listeners.retain(|batch_id, _| *batch_id >= current);
        before - self.listeners.len()
    }

    /// Remove and return the listeners registered for `batch_id`, in registration order
    pub fn acknowledge(&mut self, batch_id: u64) -> SmallVec<[BatchListener; 2]> {
        self.listeners.remove(&batch_id).unwrap_or_default()
    }

    /// Number of batch ids with listeners still awaiting acknowledgment
    pub fn pending_listener_batches(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for ConfigBatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the batch id out of a `configure` acknowledgment.
///
/// Accepts `{"batchId": 3}` as well as `{"batchId": "3"}`.
pub fn parse_batch_ack(data: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    match value.get("batchId")? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_batch_ids_start_at_one_and_increase() {
        let mut batcher = ConfigBatcher::new();
        assert_eq!(batcher.current_batch_id(), 1);

        batcher.queue_subscribe(Filter::new().with_channel("jobs"));
        let (id, _) = batcher.take_batch("d1").unwrap();
        assert_eq!(id, 1);
        assert_eq!(batcher.current_batch_id(), 2);

        batcher.queue_unsubscribe(Filter::new().with_channel("jobs"));
        let (id, _) = batcher.take_batch("d1").unwrap();
        assert_eq!(id, 2);
        assert_eq!(batcher.last_sent().unwrap().batch_id, 2);
    }

    #[test]
    fn test_empty_batch_is_not_sent() {
        let mut batcher = ConfigBatcher::new();
        assert!(batcher.take_batch("d1").is_none());
        assert_eq!(batcher.current_batch_id(), 1);
    }

    #[test]
    fn test_payload_shape() {
        let mut batcher = ConfigBatcher::new();
        batcher.queue_subscribe(Filter::new().with("status", "done").with_channel("jobs"));
        let (_, payload) = batcher.take_batch("d1").unwrap();

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "subscribe": [{"jenkins_channel": "jobs", "status": "done"}],
                "unsubscribe": [],
                "dispatcherId": "d1"
            })
        );
        assert!(!batcher.has_pending());
    }

    #[test]
    fn test_listeners_fire_in_registration_order_once() {
        let mut batcher = ConfigBatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let log = log.clone();
            batcher.on_batch_complete(Box::new(move || log.lock().unwrap().push(n)));
        }
        batcher.queue_subscribe(Filter::new().with_channel("jobs"));
        batcher.take_batch("d1");

        let later = log.clone();
        assert_eq!(
            batcher.on_batch_complete(Box::new(move || later.lock().unwrap().push(99))),
            2
        );

        for listener in batcher.acknowledge(1) {
            listener();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(batcher.acknowledge(1).is_empty());
        assert_eq!(batcher.pending_listener_batches(), 1);
    }

    #[test]
    fn test_discard_pending_keeps_batch_id() {
        let mut batcher = ConfigBatcher::new();
        batcher.queue_subscribe(Filter::new().with_channel("jobs"));
        batcher.on_batch_complete(Box::new(|| {}));

        batcher.discard_pending();
        assert!(!batcher.has_pending());
        assert_eq!(batcher.current_batch_id(), 1);
        assert_eq!(batcher.pending_listener_batches(), 1);
    }

    #[test]
    fn test_drop_unacknowledged_keeps_unsent_batch() {
        let mut batcher = ConfigBatcher::new();
        batcher.on_batch_complete(Box::new(|| {}));
        batcher.queue_subscribe(Filter::new().with_channel("jobs"));
        batcher.take_batch("d1");
        batcher.on_batch_complete(Box::new(|| {}));
        assert_eq!(batcher.pending_listener_batches(), 2);

        assert_eq!(batcher.drop_unacknowledged(), 1);
        assert_eq!(batcher.pending_listener_batches(), 1);
        assert!(batcher.acknowledge(1).is_empty());
        assert_eq!(batcher.acknowledge(2).len(), 1);
    }

    #[test]
    fn test_parse_batch_ack() {
        assert_eq!(parse_batch_ack(r#"{"batchId": 3}"#), Some(3));
        assert_eq!(parse_batch_ack(r#"{"batchId": "4"}"#), Some(4));
        assert_eq!(parse_batch_ack(r#"{"other": 1}"#), None);
        assert_eq!(parse_batch_ack("not json"), None);
    }
}

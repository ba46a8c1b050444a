//! Collaborator seams: HTTP requests, the push transport and per-tab storage.
//!
//! The connection consumes these as capabilities. Default implementations:
//! - [`ReqwestHttpClient`] for plain GET/POST requests
//! - [`EventSourceTransport`] for the server-push channel
//! - [`MemoryTabStorage`] for the per-tab identity

mod eventsource;
mod http;
mod storage;

pub use eventsource::EventSourceTransport;
pub use http::ReqwestHttpClient;
pub use storage::MemoryTabStorage;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

/// Response of a completed HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Plain HTTP request helper.
///
/// `Err` means no response was received at all; any HTTP status, including
/// error statuses, is returned as `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse>;
}

/// Signals emitted by the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// Channel opened; payload is the session info JSON
    Open(String),
    /// Transport-level error
    Error(String),
    /// Answer to a health-check request
    Pingback,
    /// Configuration batch acknowledgment; payload carries `batchId`
    Configure(String),
    /// Server-directed forced refresh
    Reload,
    /// Event published on a named channel
    Event { channel: String, data: String },
}

impl ChannelSignal {
    /// Map a named push event onto a signal
    pub fn from_event(event_type: &str, data: String) -> Self {
        match event_type {
            "open" => ChannelSignal::Open(data),
            "error" => ChannelSignal::Error(data),
            "pingback" => ChannelSignal::Pingback,
            "configure" => ChannelSignal::Configure(data),
            "reload" => ChannelSignal::Reload,
            channel => ChannelSignal::Event {
                channel: channel.to_string(),
                data,
            },
        }
    }
}

/// A live push channel: a stream of signals plus a close handle.
///
/// Dropping the channel closes it.
pub struct PushChannel {
    signals: mpsc::UnboundedReceiver<ChannelSignal>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl PushChannel {
    pub fn new(
        signals: mpsc::UnboundedReceiver<ChannelSignal>,
        close_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            signals,
            close_tx: Some(close_tx),
        }
    }

    /// Next signal, or `None` once the underlying stream has ended
    pub async fn next_signal(&mut self) -> Option<ChannelSignal> {
        self.signals.recv().await
    }

    pub fn close(mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Host push-transport primitive
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a push channel on `url`
    async fn open(&self, url: &str) -> Result<PushChannel>;
}

/// Persistent per-tab storage primitive
pub trait TabStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);
}

/// The collaborators a connection consumes
#[derive(Clone)]
pub struct Collaborators {
    pub http: Arc<dyn HttpClient>,
    pub transport: Arc<dyn PushTransport>,
    pub storage: Arc<dyn TabStorage>,
}

impl Collaborators {
    pub fn new(
        http: Arc<dyn HttpClient>,
        transport: Arc<dyn PushTransport>,
        storage: Arc<dyn TabStorage>,
    ) -> Self {
        Self {
            http,
            transport,
            storage,
        }
    }

    /// reqwest + eventsource + in-memory tab storage
    pub fn http_defaults() -> Result<Self> {
        Ok(Self {
            http: Arc::new(ReqwestHttpClient::new()?),
            transport: Arc::new(EventSourceTransport::new()),
            storage: Arc::new(MemoryTabStorage::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_mapping() {
        assert_eq!(
            ChannelSignal::from_event("open", "{}".into()),
            ChannelSignal::Open("{}".into())
        );
        assert_eq!(
            ChannelSignal::from_event("pingback", String::new()),
            ChannelSignal::Pingback
        );
        assert_eq!(
            ChannelSignal::from_event("reload", String::new()),
            ChannelSignal::Reload
        );
        assert_eq!(
            ChannelSignal::from_event("jobs", "{\"a\":1}".into()),
            ChannelSignal::Event {
                channel: "jobs".into(),
                data: "{\"a\":1}".into()
            }
        );
    }

    #[test]
    fn test_http_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(302, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }

    #[tokio::test]
    async fn test_push_channel_close_notifies_transport() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (close_tx, mut close_rx) = oneshot::channel();
        let mut channel = PushChannel::new(rx, close_tx);

        tx.send(ChannelSignal::Pingback).unwrap();
        assert_eq!(channel.next_signal().await, Some(ChannelSignal::Pingback));

        channel.close();
        assert!(close_rx.try_recv().is_ok());
    }
}

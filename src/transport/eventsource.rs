//! Server-sent events push transport

use async_trait::async_trait;
use eventsource_client::{self as es, Client};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

use super::{ChannelSignal, PushChannel, PushTransport};
use crate::error::{ClientError, Result};

/// Opens push channels as server-sent event streams
#[derive(Debug, Default)]
pub struct EventSourceTransport;

impl EventSourceTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushTransport for EventSourceTransport {
    #[tracing::instrument(name = "transport.open", skip(self))]
    async fn open(&self, url: &str) -> Result<PushChannel> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::TransportUnsupported(format!(
                "event streams need an http(s) URL, got {}",
                url
            )));
        }

        let client = es::ClientBuilder::for_url(url)
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .build();

        let (tx, rx) = mpsc::unbounded_channel();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let label = url.to_string();

        tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                tokio::select! {
                    _ = &mut close_rx => {
                        tracing::debug!(url = %label, "Push channel closed");
                        break;
                    }
                    item = stream.next() => {
                        let signal = match item {
                            Some(Ok(es::SSE::Event(event))) => {
                                ChannelSignal::from_event(&event.event_type, event.data)
                            }
                            Some(Ok(es::SSE::Comment(_))) => {
                                // Ignore comments (keep-alive)
                                continue;
                            }
                            Some(Err(e)) => ChannelSignal::Error(e.to_string()),
                            None => {
                                tracing::debug!(url = %label, "Push stream ended");
                                break;
                            }
                        };

                        if tx.send(signal).is_err() {
                            tracing::debug!(url = %label, "Push channel receiver dropped");
                            break;
                        }
                    }
                }
            }
        });

        Ok(PushChannel::new(rx, close_tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_urls() {
        let transport = EventSourceTransport::new();
        let err = transport.open("ws://localhost/listen/x").await.err().unwrap();
        assert!(matches!(err, ClientError::TransportUnsupported(_)));
    }
}

//! Caller-facing connection handle

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::actor::{Command, ConnectionActor};
use super::context::ConnectionContext;
use super::types::{ConnectionOptions, ConnectionState, ConnectionStats, OnConnected, SessionInfo, SharedStatus};
use crate::error::{ClientError, Result};
use crate::health::{ChannelFault, ConnectionStatus};
use crate::subscription::{BatchListener, SubscribeOptions, Subscriber};
use crate::transport::Collaborators;

/// A client connection to the SSE gateway.
///
/// Cheap to clone; all clones drive the same connection. The connection's
/// task stops, and the client id is released, once every handle is dropped.
///
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct SseConnection {
    client_id: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<SharedStatus>,
}

impl SseConnection {
    /// Create a connection registered in `context`.
    ///
    /// Without a configured client id one is generated. Fails with
    /// [`ClientError::AlreadyConnected`] if another live connection in the
    /// same context holds the id.
    pub fn new(
        context: &ConnectionContext,
        options: ConnectionOptions,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let client_id = options
            .client
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| context.next_client_id());

        let token = context.next_token();
        if !context.claim(&client_id, token) {
            tracing::error!(client_id = %client_id, "A connection with this client id already exists");
            return Err(ClientError::AlreadyConnected { client_id });
        }

        let (commands, rx) = mpsc::unbounded_channel();
        let status = Arc::new(SharedStatus::new());
        let actor = ConnectionActor::new(
            client_id.clone(),
            token,
            context.clone(),
            options,
            collaborators,
            status.clone(),
            rx,
        );
        tokio::spawn(actor.run());

        tracing::debug!(client_id = %client_id, "Connection created");

        Ok(Self {
            client_id: client_id.into(),
            commands,
            status,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether the push channel is currently established
    pub fn is_connected(&self) -> bool {
        self.status.channel_open()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Perform the handshake and open the push channel.
    ///
    /// Returns once the handshake has been started. A no-op while a channel
    /// exists or a handshake is in flight.
    pub async fn connect(&self) -> Result<()> {
        self.start(None).await
    }

    /// Like [`connect`](Self::connect), invoking `on_connected` each time the gateway opens the channel
    pub async fn connect_with<F>(&self, on_connected: F) -> Result<()>
    where
        F: Fn(&SessionInfo) + Send + 'static,
    {
        self.start(Some(Box::new(on_connected))).await
    }

    async fn start(&self, on_connected: Option<OnConnected>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect {
            on_connected,
            reply,
        })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Close the push channel and release the client id.
    ///
    /// Subscriptions are kept and re-sent on the next [`connect`](Self::connect).
    pub fn disconnect(&self) {
        let _ = self.send(Command::Disconnect);
    }

    /// Register a subscription, returning the subscriber to pass to [`unsubscribe`](Self::unsubscribe)
    pub fn subscribe(&self, options: SubscribeOptions) -> Result<Subscriber> {
        let (subscription, on_subscribed) = options.into_subscription()?;
        let subscriber = subscription.subscriber.clone();
        self.send(Command::Subscribe {
            subscription,
            on_subscribed,
        })?;
        Ok(subscriber)
    }

    /// Remove every subscription registered with `subscriber`
    pub fn unsubscribe(
        &self,
        subscriber: &Subscriber,
        on_unsubscribed: Option<BatchListener>,
    ) -> Result<()> {
        self.send(Command::Unsubscribe {
            subscriber: subscriber.clone(),
            on_unsubscribed,
        })
    }

    /// Set the handler receiving channel errors that did not heal
    pub fn on_error<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&ChannelFault) + Send + 'static,
    {
        self.send(Command::OnError(Box::new(handler)))
    }

    /// Poll the gateway until it responds, reporting each attempt to `handler`.
    ///
    /// Fails with [`ClientError::NotStarted`] before a successful [`connect`](Self::connect).
    pub async fn wait_connection_ok<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(ConnectionStatus) + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WaitConnectionOk {
            handler: Box::new(handler),
            reply,
        })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    pub async fn stats(&self) -> Result<ConnectionStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }
}

impl std::fmt::Debug for SseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseConnection")
            .field("client_id", &self.client_id)
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .finish()
    }
}

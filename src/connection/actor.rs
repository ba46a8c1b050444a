//! The task owning a connection's state.
//!
//! All bookkeeping (subscriptions, listeners, batches, healing) lives here and
//! is only touched from this task. Handles post [`Command`]s; network requests
//! run in spawned tasks that post a [`Completion`] back. Each input is fully
//! processed before the next one is taken.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::Instrument;

use super::context::ConnectionContext;
use super::types::{
    ConfigErrorHook, ConfigFailure, ConnectionOptions, ConnectionState, ConnectionStats,
    ConnectionStatusHandler, ErrorHandler, HandshakeResponse, OnConnected, ReloadHook,
    SessionInfo, SharedStatus,
};
use crate::config::{resolve_root_url, ClientConfig, HealthConfig};
use crate::dispatch::{invoke_guarded, ChannelDispatcher};
use crate::error::{ClientError, Result};
use crate::health::{
    is_unreachable, ChannelFault, ConnectionStatus, HealAction, HealEvent, HealthTracker,
};
use crate::metrics::{BatchMetrics, ConnectionMetrics, HealthMetrics};
use crate::subscription::{
    parse_batch_ack, BatchListener, ConfigBatcher, ConfigurePayload, Subscriber, Subscription,
    SubscriptionRegistry,
};
use crate::transport::{ChannelSignal, Collaborators, HttpClient, HttpResponse, PushChannel, PushTransport};

/// Prefix of the storage key holding a client's per-tab identity
const TAB_STORAGE_KEY_PREFIX: &str = "jenkins-sse-gateway-tab-";

/// Length of the random suffix distinguishing tabs
const TAB_SUFFIX_LEN: usize = 8;

/// Requests from connection handles
pub(crate) enum Command {
    Connect {
        on_connected: Option<OnConnected>,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect,
    Subscribe {
        subscription: Subscription,
        on_subscribed: Option<BatchListener>,
    },
    Unsubscribe {
        subscriber: Subscriber,
        on_unsubscribed: Option<BatchListener>,
    },
    OnError(ErrorHandler),
    WaitConnectionOk {
        handler: ConnectionStatusHandler,
        reply: oneshot::Sender<Result<()>>,
    },
    Stats {
        reply: oneshot::Sender<ConnectionStats>,
    },
}

/// Results of work spawned by the connection task
enum Completion {
    Established {
        generation: u64,
        result: Result<PushChannel>,
    },
    ConfigureSent {
        batch_id: u64,
        payload: ConfigurePayload,
        result: Result<HttpResponse>,
    },
    HealPing {
        result: Result<HttpResponse>,
    },
    ConnectionCheck {
        status_code: u16,
    },
}

pub(crate) struct ConnectionActor {
    client_id: String,
    token: u64,
    context: ConnectionContext,
    client: ClientConfig,
    health_config: HealthConfig,
    collaborators: Collaborators,
    on_config_error: Option<ConfigErrorHook>,
    on_reload: Option<ReloadHook>,
    status: Arc<SharedStatus>,

    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,

    /// Cleared by a failed handshake or a disconnect; subscribe/unsubscribe are no-ops while false
    connectable: bool,
    /// Bumped on disconnect so late handshake results can be recognized
    generation: u64,
    root_url: Option<String>,
    tab_client_id: Option<String>,
    channel: Option<PushChannel>,
    session: Option<SessionInfo>,
    on_connected: Option<OnConnected>,
    error_handler: Option<ErrorHandler>,
    rearm_on_connect: bool,

    registry: SubscriptionRegistry,
    dispatcher: ChannelDispatcher,
    batcher: ConfigBatcher,
    health: HealthTracker,

    check_handler: Option<ConnectionStatusHandler>,
    check_errors: u32,
    check_in_flight: bool,

    configure_at: Option<Instant>,
    heal_at: Option<Instant>,
    pingback_at: Option<Instant>,
    check_at: Option<Instant>,
}

impl ConnectionActor {
    pub(crate) fn new(
        client_id: String,
        token: u64,
        context: ConnectionContext,
        options: ConnectionOptions,
        collaborators: Collaborators,
        status: Arc<SharedStatus>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        Self {
            client_id,
            token,
            context,
            client: options.client,
            health_config: options.health,
            collaborators,
            on_config_error: options.on_config_error,
            on_reload: options.on_reload,
            status,
            commands,
            completions_tx,
            completions,
            connectable: true,
            generation: 0,
            root_url: None,
            tab_client_id: None,
            channel: None,
            session: None,
            on_connected: None,
            error_handler: None,
            rearm_on_connect: false,
            registry: SubscriptionRegistry::new(),
            dispatcher: ChannelDispatcher::new(),
            batcher: ConfigBatcher::new(),
            health: HealthTracker::new(),
            check_handler: None,
            check_errors: 0,
            check_in_flight: false,
            configure_at: None,
            heal_at: None,
            pingback_at: None,
            check_at: None,
        }
    }

    /// Run until every handle has been dropped
    pub(crate) async fn run(mut self) {
        tracing::debug!(client_id = %self.client_id, "Connection task started");

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion);
                }
                signal = next_signal(&mut self.channel) => {
                    self.handle_signal(signal);
                }
                _ = deadline(self.configure_at) => {
                    self.configure_at = None;
                    self.do_configure();
                }
                _ = deadline(self.heal_at) => {
                    self.heal_at = None;
                    self.apply_health(HealEvent::HealTimerElapsed);
                }
                _ = deadline(self.pingback_at) => {
                    self.pingback_at = None;
                    self.apply_health(HealEvent::PingbackTimerElapsed);
                }
                _ = deadline(self.check_at) => {
                    self.check_at = None;
                    self.send_connection_check();
                }
            }
        }

        self.disconnect();
        tracing::debug!(client_id = %self.client_id, "Connection task stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                on_connected,
                reply,
            } => {
                let result = self.connect(on_connected);
                let _ = reply.send(result);
            }
            Command::Disconnect => self.disconnect(),
            Command::Subscribe {
                subscription,
                on_subscribed,
            } => self.subscribe(subscription, on_subscribed),
            Command::Unsubscribe {
                subscriber,
                on_unsubscribed,
            } => self.unsubscribe(&subscriber, on_unsubscribed),
            Command::OnError(handler) => {
                self.error_handler = Some(handler);
            }
            Command::WaitConnectionOk { handler, reply } => {
                let result = self.wait_connection_ok(handler);
                let _ = reply.send(result);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Established { generation, result } => {
                self.on_established(generation, result)
            }
            Completion::ConfigureSent {
                batch_id,
                payload,
                result,
            } => self.on_configure_sent(batch_id, payload, result),
            Completion::HealPing { result } => match result {
                Ok(response) => {
                    tracing::debug!(status = response.status, "Health-check request completed")
                }
                Err(e) => tracing::debug!(error = %e, "Health-check request failed"),
            },
            Completion::ConnectionCheck { status_code } => self.on_connection_check(status_code),
        }
    }

    fn handle_signal(&mut self, signal: Option<ChannelSignal>) {
        let Some(signal) = signal else {
            self.on_channel_lost();
            return;
        };

        match signal {
            ChannelSignal::Open(data) => self.on_open(&data),
            ChannelSignal::Error(message) => {
                self.apply_health(HealEvent::Error(ChannelFault::new(message)))
            }
            ChannelSignal::Pingback => {
                tracing::debug!(client_id = %self.client_id, "Pingback received");
                self.apply_health(HealEvent::Recovered);
            }
            ChannelSignal::Configure(data) => self.on_configure_ack(&data),
            ChannelSignal::Reload => self.on_reload(),
            ChannelSignal::Event { channel, data } => {
                self.dispatcher.dispatch(&self.registry, &channel, &data);
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn connect(&mut self, on_connected: Option<OnConnected>) -> Result<()> {
        if self.channel.is_some() || self.status.state() == ConnectionState::Connecting {
            tracing::debug!(client_id = %self.client_id, "Already connected, ignoring connect");
            return Ok(());
        }

        if !self.context.claim(&self.client_id, self.token) {
            tracing::error!(
                client_id = %self.client_id,
                "Another connection is already registered for this client id"
            );
            return Err(ClientError::AlreadyConnected {
                client_id: self.client_id.clone(),
            });
        }

        let tab_client_id = self.resolve_tab_client_id();

        let Some(root_url) = resolve_root_url(self.client.jenkins_url.as_deref()) else {
            tracing::warn!(
                client_id = %self.client_id,
                "Unable to determine the gateway root URL, connection not established"
            );
            return Err(ClientError::RootUrlUnresolvable);
        };
        self.root_url = Some(root_url.clone());

        self.connectable = true;
        self.on_connected = on_connected;
        if self.rearm_on_connect {
            self.rearm_subscriptions();
        }
        if self.batcher.has_pending() && self.configure_at.is_none() {
            self.arm_configure(self.client.batch_config_delay());
        }

        self.status.set_state(ConnectionState::Connecting);
        self.spawn_establish(root_url, tab_client_id);
        Ok(())
    }

    /// Per-tab identity, stable for this client id across reconnects sharing the same storage
    fn resolve_tab_client_id(&mut self) -> String {
        let storage = &self.collaborators.storage;
        let key = format!("{}{}", TAB_STORAGE_KEY_PREFIX, self.client_id);

        let tab_client_id = match storage.get(&key) {
            Some(existing) => existing,
            None => {
                let generated = format!("{}-{}", self.client_id, random_suffix());
                storage.set(&key, &generated);
                tracing::debug!(tab_client_id = %generated, "Generated per-tab client id");
                generated
            }
        };

        self.tab_client_id = Some(tab_client_id.clone());
        tab_client_id
    }

    fn spawn_establish(&self, root_url: String, tab_client_id: String) {
        let http = self.collaborators.http.clone();
        let transport = self.collaborators.transport.clone();
        let completions = self.completions_tx.clone();
        let generation = self.generation;
        let send_session_id = self.client.send_session_id;
        let span = tracing::info_span!("connection.establish", client_id = %self.client_id);

        tokio::spawn(
            async move {
                let result = establish(
                    http.as_ref(),
                    transport.as_ref(),
                    &root_url,
                    &tab_client_id,
                    send_session_id,
                )
                .await;
                let _ = completions.send(Completion::Established { generation, result });
            }
            .instrument(span),
        );
    }

    fn on_established(&mut self, generation: u64, result: Result<PushChannel>) {
        if generation != self.generation {
            if let Ok(channel) = result {
                tracing::debug!(
                    client_id = %self.client_id,
                    "Channel opened after disconnect, closing it"
                );
                channel.close();
            }
            return;
        }

        match result {
            Ok(channel) => {
                ConnectionMetrics::record_handshake_ok();
                ConnectionMetrics::record_channel_opened();
                self.channel = Some(channel);
                self.status.set_channel_open(true);
                self.dispatcher.install_queued();
                tracing::info!(client_id = %self.client_id, "Push channel established");
            }
            Err(ClientError::HandshakeFailed { status, body }) => {
                ConnectionMetrics::record_handshake_failed();
                tracing::error!(
                    client_id = %self.client_id,
                    status = status,
                    body = %body,
                    "Handshake failed, connection is no longer connectable"
                );
                self.connectable = false;
                self.forget_session();
                self.status.set_state(ConnectionState::Disconnected);
            }
            Err(e @ ClientError::TransportUnsupported(_)) => {
                tracing::warn!(client_id = %self.client_id, error = %e, "Push channel will not open");
                self.status.set_state(ConnectionState::Disconnected);
            }
            Err(e) => {
                tracing::error!(client_id = %self.client_id, error = %e, "Failed to open push channel");
                self.status.set_state(ConnectionState::Disconnected);
            }
        }
    }

    fn on_open(&mut self, data: &str) {
        self.apply_health(HealEvent::Recovered);

        let session: SessionInfo = match serde_json::from_str(data) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(client_id = %self.client_id, error = %e, "Invalid session info on channel open");
                return;
            }
        };

        tracing::info!(
            client_id = %self.client_id,
            dispatcher_id = %session.dispatcher_id,
            "Push channel open"
        );
        self.status.set_state(ConnectionState::Connected);

        let session = &*self.session.insert(session);
        if let Some(on_connected) = &self.on_connected {
            invoke_guarded("on_connected", || on_connected(session));
        }
    }

    fn on_channel_lost(&mut self) {
        let error = ClientError::Channel("push stream ended".to_string());
        tracing::warn!(client_id = %self.client_id, error = %error, "Push channel lost");
        if self.channel.take().is_some() {
            ConnectionMetrics::record_channel_closed();
        }
        self.status.set_channel_open(false);
        self.forget_session();
        self.status.set_state(ConnectionState::Disconnected);
        self.apply_health(HealEvent::Error(ChannelFault::new(error.to_string())));
    }

    fn on_reload(&self) {
        match &self.on_reload {
            Some(hook) => {
                tracing::info!(client_id = %self.client_id, "Gateway requested a reload");
                invoke_guarded("reload_hook", || hook());
            }
            None => tracing::info!(
                client_id = %self.client_id,
                "Gateway requested a reload, no reload hook registered"
            ),
        }
    }

    fn disconnect(&mut self) {
        let was_active = self.channel.is_some() || self.status.state() != ConnectionState::Disconnected;
        self.status.set_state(ConnectionState::Disconnecting);

        if let Some(channel) = self.channel.take() {
            channel.close();
            ConnectionMetrics::record_channel_closed();
        }
        self.status.set_channel_open(false);
        self.forget_session();
        self.context.release(&self.client_id, self.token);
        self.connectable = false;

        self.health.reset();
        self.heal_at = None;
        self.pingback_at = None;
        self.check_handler = None;
        self.check_at = None;

        self.generation += 1;
        self.status.set_state(ConnectionState::Disconnected);

        if was_active {
            tracing::info!(
                client_id = %self.client_id,
                retained_subscriptions = self.registry.len(),
                "Disconnected"
            );
        }
    }

    /// Drop everything tied to the gateway-side dispatcher.
    ///
    /// Subscriptions stay registered and are re-sent by the next `connect()`.
    fn forget_session(&mut self) {
        self.session = None;
        self.dispatcher.clear();
        self.configure_at = None;
        self.batcher.discard_pending();

        let dropped = self.batcher.drop_unacknowledged();
        if dropped > 0 {
            tracing::debug!(
                client_id = %self.client_id,
                batches = dropped,
                "Dropped listeners of unacknowledged batches"
            );
        }

        self.rearm_on_connect = !self.registry.is_empty();
    }

    /// Re-install listeners and re-queue configuration for retained subscriptions
    fn rearm_subscriptions(&mut self) {
        self.rearm_on_connect = false;
        if self.registry.is_empty() {
            return;
        }

        // Every retained subscription is queued again below
        self.batcher.discard_pending();
        for subscription in self.registry.iter() {
            self.dispatcher.ensure_listener(&subscription.channel, false);
            self.batcher.queue_subscribe(subscription.config.clone());
        }
        self.arm_configure(self.client.batch_config_delay());

        tracing::info!(
            client_id = %self.client_id,
            subscriptions = self.registry.len(),
            "Re-arming retained subscriptions"
        );
    }

    // ------------------------------------------------------------------
    // Subscriptions and configuration batches
    // ------------------------------------------------------------------

    fn subscribe(&mut self, subscription: Subscription, on_subscribed: Option<BatchListener>) {
        self.configure_at = None;
        if !self.connectable {
            tracing::debug!(
                client_id = %self.client_id,
                channel = %subscription.channel,
                "Connection not connectable, ignoring subscribe"
            );
            return;
        }

        self.batcher.queue_subscribe(subscription.config.clone());
        self.dispatcher
            .ensure_listener(&subscription.channel, self.channel.is_some());
        self.registry.add(subscription);
        self.arm_configure(self.client.batch_config_delay());

        if let Some(listener) = on_subscribed {
            self.batcher.on_batch_complete(listener);
        }
    }

    fn unsubscribe(&mut self, subscriber: &Subscriber, on_unsubscribed: Option<BatchListener>) {
        self.configure_at = None;
        if !self.connectable {
            tracing::debug!(client_id = %self.client_id, "Connection not connectable, ignoring unsubscribe");
            return;
        }

        // Channel listeners stay installed until disconnect
        for removed in self.registry.remove_by_subscriber(subscriber) {
            self.batcher.queue_unsubscribe(removed.config);
        }
        self.arm_configure(self.client.batch_config_delay());

        if let Some(listener) = on_unsubscribed {
            self.batcher.on_batch_complete(listener);
        }
    }

    fn arm_configure(&mut self, delay: std::time::Duration) {
        self.configure_at = Some(Instant::now() + delay);
    }

    fn do_configure(&mut self) {
        let (Some(session), Some(root_url)) = (&self.session, &self.root_url) else {
            // Push channel not open yet
            self.arm_configure(self.client.configure_retry());
            return;
        };

        let url_root = root_url.clone();
        let dispatcher_id = session.dispatcher_id.clone();
        let Some((batch_id, payload)) = self.batcher.take_batch(&dispatcher_id) else {
            return;
        };

        let body = match serde_json::to_value(&payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(batch_id = batch_id, error = %e, "Failed to encode configuration batch");
                return;
            }
        };

        BatchMetrics::record_sent();
        tracing::debug!(
            client_id = %self.client_id,
            batch_id = batch_id,
            subscribe = payload.subscribe.len(),
            unsubscribe = payload.unsubscribe.len(),
            "Sending configuration batch"
        );

        let http = self.collaborators.http.clone();
        let completions = self.completions_tx.clone();
        let url = format!("{}/configure?batchId={}", url_root, batch_id);
        let span = tracing::debug_span!("connection.configure", batch_id = batch_id);

        tokio::spawn(
            async move {
                let result = http.post_json(&url, &body).await;
                let _ = completions.send(Completion::ConfigureSent {
                    batch_id,
                    payload,
                    result,
                });
            }
            .instrument(span),
        );
    }

    fn on_configure_sent(
        &mut self,
        batch_id: u64,
        payload: ConfigurePayload,
        result: Result<HttpResponse>,
    ) {
        let failure = match result {
            Ok(response) if response.is_success() => {
                tracing::debug!(batch_id = batch_id, "Configuration batch accepted");
                return;
            }
            Ok(response) => ConfigFailure::from_response(batch_id, &response),
            Err(e) => ConfigFailure {
                batch_id,
                status: None,
                message: e.to_string(),
            },
        };

        BatchMetrics::record_rejected();
        let error = ClientError::ConfigurationRejected {
            batch_id,
            status: failure.status.unwrap_or(0),
            body: failure.message.clone(),
        };
        tracing::warn!(client_id = %self.client_id, error = %error, "Configuration request failed");

        if let Some(hook) = &self.on_config_error {
            invoke_guarded("config_error_hook", || hook(&payload, &failure));
        }
    }

    fn on_configure_ack(&mut self, data: &str) {
        let Some(batch_id) = parse_batch_ack(data) else {
            tracing::warn!(client_id = %self.client_id, data = %data, "Ignoring configure signal without a batch id");
            return;
        };

        BatchMetrics::record_acknowledged();
        let listeners = self.batcher.acknowledge(batch_id);
        tracing::debug!(
            batch_id = batch_id,
            listeners = listeners.len(),
            "Configuration batch acknowledged"
        );

        for listener in listeners {
            invoke_guarded("batch_listener", listener);
        }
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    fn apply_health(&mut self, event: HealEvent) {
        for action in self.health.handle(event) {
            match action {
                HealAction::ArmHealTimer => {
                    self.heal_at = Some(Instant::now() + self.health_config.heal_wait());
                }
                HealAction::SendPing => self.send_heal_ping(),
                HealAction::ArmPingbackTimer => {
                    self.pingback_at = Some(Instant::now() + self.health_config.pingback_wait());
                }
                HealAction::CancelTimers => {
                    self.heal_at = None;
                    self.pingback_at = None;
                }
                HealAction::Report(fault) => self.report_error(&fault),
            }
        }
    }

    fn report_error(&self, fault: &ChannelFault) {
        match &self.error_handler {
            Some(handler) => {
                invoke_guarded("error_handler", || handler(fault));
            }
            None => tracing::warn!(
                client_id = %self.client_id,
                error = %fault.message,
                "Channel error not healed and no error handler registered"
            ),
        }
    }

    fn send_heal_ping(&self) {
        let Some(root_url) = &self.root_url else {
            return;
        };
        let url = match &self.session {
            Some(session) => format!(
                "{}/ping?dispatcherId={}",
                root_url,
                urlencoding::encode(&session.dispatcher_id)
            ),
            None => format!("{}/ping", root_url),
        };

        let http = self.collaborators.http.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = http.get(&url).await;
            let _ = completions.send(Completion::HealPing { result });
        });
    }

    fn wait_connection_ok(&mut self, handler: ConnectionStatusHandler) -> Result<()> {
        if self.root_url.is_none() {
            return Err(ClientError::NotStarted);
        }

        self.check_handler = Some(handler);
        self.check_errors = 0;
        self.check_at = None;
        if !self.check_in_flight {
            self.send_connection_check();
        }
        Ok(())
    }

    fn send_connection_check(&mut self) {
        let Some(root_url) = &self.root_url else {
            return;
        };
        self.check_in_flight = true;

        let url = format!("{}/ping", root_url);
        let http = self.collaborators.http.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let status_code = match http.get(&url).await {
                Ok(response) => response.status,
                Err(e) => {
                    tracing::debug!(error = %e, "Connection check received no response");
                    0
                }
            };
            let _ = completions.send(Completion::ConnectionCheck { status_code });
        });
    }

    fn on_connection_check(&mut self, status_code: u16) {
        self.check_in_flight = false;
        let Some(handler) = &self.check_handler else {
            return;
        };

        let connect_error = is_unreachable(status_code);
        if connect_error {
            self.check_errors += 1;
        }
        HealthMetrics::record_check(!connect_error);

        let status = ConnectionStatus {
            status_code,
            connect_error,
            connect_error_count: self.check_errors,
        };
        invoke_guarded("connection_status_handler", || handler(status));

        if connect_error {
            self.check_at = Some(Instant::now() + self.health_config.connection_check_retry());
        } else {
            self.check_handler = None;
        }
    }

    fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            client_id: self.client_id.clone(),
            tab_client_id: self.tab_client_id.clone(),
            state: self.status.state(),
            connected: self.channel.is_some(),
            dispatcher_id: self.session.as_ref().map(|s| s.dispatcher_id.clone()),
            subscriptions: self.registry.len(),
            channel_listeners: self.dispatcher.listener_names(),
            current_batch_id: self.batcher.current_batch_id(),
            pending_batch_listeners: self.batcher.pending_listener_batches(),
            health_state: self.health.state(),
            outstanding_errors: self.health.outstanding_errors(),
        }
    }
}

/// Handshake, then open the push channel on the listen endpoint
async fn establish(
    http: &dyn HttpClient,
    transport: &dyn PushTransport,
    root_url: &str,
    tab_client_id: &str,
    send_session_id: bool,
) -> Result<PushChannel> {
    let connect_url = format!(
        "{}/connect?clientId={}",
        root_url,
        urlencoding::encode(tab_client_id)
    );

    let response = http
        .get(&connect_url)
        .await
        .map_err(|e| ClientError::HandshakeFailed {
            status: 0,
            body: e.to_string(),
        })?;
    if !response.is_success() {
        return Err(ClientError::HandshakeFailed {
            status: response.status,
            body: response.body,
        });
    }

    let handshake: HandshakeResponse = match serde_json::from_str(&response.body) {
        Ok(handshake) => handshake,
        Err(e) => {
            tracing::warn!(error = %e, "Unexpected handshake response body");
            HandshakeResponse::default()
        }
    };

    let url = listen_url(
        root_url,
        tab_client_id,
        handshake.jsessionid.as_deref(),
        send_session_id,
    );
    transport.open(&url).await
}

pub(crate) fn listen_url(
    root_url: &str,
    tab_client_id: &str,
    jsessionid: Option<&str>,
    send_session_id: bool,
) -> String {
    let mut url = format!(
        "{}/listen/{}",
        root_url,
        urlencoding::encode(tab_client_id)
    );
    if send_session_id {
        if let Some(session_id) = jsessionid {
            url.push_str(";jsessionid=");
            url.push_str(session_id);
        }
    }
    url
}

fn random_suffix() -> String {
    use rand::distr::Alphanumeric;
    use rand::Rng;

    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TAB_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

async fn next_signal(channel: &mut Option<PushChannel>) -> Option<ChannelSignal> {
    match channel {
        Some(channel) => channel.next_signal().await,
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

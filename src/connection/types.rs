//! Connection state, session info, options and statistics

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ClientConfig, HealthConfig, Settings};
use crate::health::{ChannelFault, ConnectionStatus, HealState};
use crate::subscription::ConfigurePayload;
use crate::transport::HttpResponse;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    /// Handshake in flight or channel not yet opened by the gateway
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Lock-free view of the connection shared between the task and its handles
#[derive(Debug)]
pub(crate) struct SharedStatus {
    state: AtomicU8,
    channel_open: AtomicBool,
}

impl SharedStatus {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            channel_open: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn channel_open(&self) -> bool {
        self.channel_open.load(Ordering::Acquire)
    }

    pub(crate) fn set_channel_open(&self, open: bool) {
        self.channel_open.store(open, Ordering::Release);
    }
}

/// Server-assigned session data received when the push channel opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(rename = "dispatcherId")]
    pub dispatcher_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Handshake response
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct HandshakeResponse {
    #[serde(default)]
    pub jsessionid: Option<String>,
}

/// Invoked with the session info on every successful channel open
pub type OnConnected = Box<dyn Fn(&SessionInfo) + Send>;

/// Receives the error reported at the end of a failed healing cycle
pub type ErrorHandler = Box<dyn Fn(&ChannelFault) + Send>;

/// Receives the outcome of each connection-check round trip
pub type ConnectionStatusHandler = Box<dyn Fn(ConnectionStatus) + Send>;

/// Invoked when a configuration request fails, with the payload and the HTTP outcome
pub type ConfigErrorHook = Arc<dyn Fn(&ConfigurePayload, &ConfigFailure) + Send + Sync>;

/// Invoked when the gateway directs the client to reload
pub type ReloadHook = Arc<dyn Fn() + Send + Sync>;

/// Outcome of a failed configuration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFailure {
    pub batch_id: u64,
    /// HTTP status, or `None` when no response was received
    pub status: Option<u16>,
    pub message: String,
}

impl ConfigFailure {
    pub(crate) fn from_response(batch_id: u64, response: &HttpResponse) -> Self {
        Self {
            batch_id,
            status: Some(response.status),
            message: response.body.clone(),
        }
    }
}

/// Options for creating a connection
#[derive(Clone, Default)]
pub struct ConnectionOptions {
    pub client: ClientConfig,
    pub health: HealthConfig,
    pub on_config_error: Option<ConfigErrorHook>,
    pub on_reload: Option<ReloadHook>,
}

impl ConnectionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            client: settings.client.clone(),
            health: settings.health.clone(),
            ..Default::default()
        }
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client.client_id = Some(client_id.into());
        self
    }

    pub fn jenkins_url(mut self, url: impl Into<String>) -> Self {
        self.client.jenkins_url = Some(url.into());
        self
    }

    pub fn send_session_id(mut self, send: bool) -> Self {
        self.client.send_session_id = send;
        self
    }

    pub fn on_config_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ConfigurePayload, &ConfigFailure) + Send + Sync + 'static,
    {
        self.on_config_error = Some(Arc::new(hook));
        self
    }

    pub fn on_reload<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_reload = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("client", &self.client)
            .field("health", &self.health)
            .field("on_config_error", &self.on_config_error.is_some())
            .field("on_reload", &self.on_reload.is_some())
            .finish()
    }
}

/// Snapshot of a connection's bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub client_id: String,
    pub tab_client_id: Option<String>,
    pub state: ConnectionState,
    pub connected: bool,
    pub dispatcher_id: Option<String>,
    pub subscriptions: usize,
    pub channel_listeners: Vec<String>,
    /// Id of the batch currently accepting operations
    pub current_batch_id: u64,
    /// Batch ids with completion listeners awaiting acknowledgment
    pub pending_batch_listeners: usize,
    pub health_state: HealState,
    pub outstanding_errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_round_trips_through_u8() {
        let status = SharedStatus::new();
        assert_eq!(status.state(), ConnectionState::Disconnected);
        status.set_state(ConnectionState::Connected);
        assert_eq!(status.state(), ConnectionState::Connected);
        assert_eq!(ConnectionState::from(42), ConnectionState::Disconnected);
    }

    #[test]
    fn test_session_info_keeps_extra_fields() {
        let info: SessionInfo =
            serde_json::from_value(json!({"dispatcherId": "d1", "dispatcherInst": 7})).unwrap();
        assert_eq!(info.dispatcher_id, "d1");
        assert_eq!(info.extra.get("dispatcherInst"), Some(&json!(7)));
    }

    #[test]
    fn test_handshake_response_tolerates_missing_session() {
        let response: HandshakeResponse = serde_json::from_str("{}").unwrap();
        assert!(response.jsessionid.is_none());
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Environment variable consulted when no root URL is configured
pub const ROOT_URL_ENV: &str = "JENKINS_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Logical client id; generated from the connection context when absent
    #[serde(default)]
    pub client_id: Option<String>,
    /// Override for the gateway root URL
    #[serde(default)]
    pub jenkins_url: Option<String>,
    /// Debounce window for batching subscribe/unsubscribe operations (ms)
    #[serde(default = "default_batch_config_delay")]
    pub batch_config_delay_ms: u64,
    /// Retry interval while waiting for session info before a flush (ms)
    #[serde(default = "default_configure_retry")]
    pub configure_retry_ms: u64,
    /// Append the session id to the listen URL
    #[serde(default)]
    pub send_session_id: bool,
    /// Channels the command-line client subscribes to
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Time to wait for a transport error to heal by itself (ms)
    #[serde(default = "default_heal_wait")]
    pub heal_wait_ms: u64,
    /// Time to wait for a pingback after the health-check request (ms)
    #[serde(default = "default_pingback_wait")]
    pub pingback_wait_ms: u64,
    /// Delay between connection checks while the server is unreachable (ms)
    #[serde(default = "default_connection_check_retry")]
    pub connection_check_retry_ms: u64,
}

fn default_batch_config_delay() -> u64 {
    100
}

fn default_configure_retry() -> u64 {
    100
}

fn default_heal_wait() -> u64 {
    5000
}

fn default_pingback_wait() -> u64 {
    5000
}

fn default_connection_check_retry() -> u64 {
    3000
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("client.batch_config_delay_ms", default_batch_config_delay())?
            .set_default("client.configure_retry_ms", default_configure_retry())?
            .set_default("client.send_session_id", false)?
            .set_default("health.heal_wait_ms", default_heal_wait())?
            .set_default("health.pingback_wait_ms", default_pingback_wait())?
            .set_default(
                "health.connection_check_retry_ms",
                default_connection_check_retry(),
            )?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SSE_GATEWAY_CLIENT__JENKINS_URL, SSE_GATEWAY_HEALTH__HEAL_WAIT_MS, etc.
            .add_source(
                Environment::with_prefix("SSE_GATEWAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("client.channels"),
            );

        builder.build()?.try_deserialize()
    }
}

impl ClientConfig {
    pub fn batch_config_delay(&self) -> Duration {
        Duration::from_millis(self.batch_config_delay_ms)
    }

    pub fn configure_retry(&self) -> Duration {
        Duration::from_millis(self.configure_retry_ms)
    }
}

impl HealthConfig {
    pub fn heal_wait(&self) -> Duration {
        Duration::from_millis(self.heal_wait_ms)
    }

    pub fn pingback_wait(&self) -> Duration {
        Duration::from_millis(self.pingback_wait_ms)
    }

    pub fn connection_check_retry(&self) -> Duration {
        Duration::from_millis(self.connection_check_retry_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            jenkins_url: None,
            batch_config_delay_ms: default_batch_config_delay(),
            configure_retry_ms: default_configure_retry(),
            send_session_id: false,
            channels: vec![],
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heal_wait_ms: default_heal_wait(),
            pingback_wait_ms: default_pingback_wait(),
            connection_check_retry_ms: default_connection_check_retry(),
        }
    }
}

/// Resolve the gateway root URL from the configured value or the environment.
///
/// Trailing path separators are stripped. Returns `None` when neither source
/// yields a non-empty URL.
pub fn resolve_root_url(configured: Option<&str>) -> Option<String> {
    let candidate = match configured {
        Some(url) => Some(url.to_string()),
        None => env::var(ROOT_URL_ENV).ok(),
    }?;

    let normalized = candidate.trim().trim_end_matches('/');
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let client = ClientConfig::default();
        assert_eq!(client.batch_config_delay_ms, 100);
        assert!(!client.send_session_id);
        assert!(client.jenkins_url.is_none());

        let health = HealthConfig::default();
        assert_eq!(health.heal_wait(), Duration::from_secs(5));
        assert_eq!(health.pingback_wait(), Duration::from_secs(5));
    }

    #[test]
    fn test_resolve_root_url_strips_trailing_separators() {
        assert_eq!(
            resolve_root_url(Some("http://jenkins/sse-gateway//")),
            Some("http://jenkins/sse-gateway".to_string())
        );
        assert_eq!(
            resolve_root_url(Some("http://jenkins")),
            Some("http://jenkins".to_string())
        );
    }

    #[test]
    fn test_resolve_root_url_rejects_empty() {
        assert_eq!(resolve_root_url(Some("/")), None);
        assert_eq!(resolve_root_url(Some("   ")), None);
    }
}

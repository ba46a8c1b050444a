use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Client id {client_id} is already connected")]
    AlreadyConnected { client_id: String },

    #[error("Unable to resolve the gateway root URL")]
    RootUrlUnresolvable,

    #[error("Push transport unsupported: {0}")]
    TransportUnsupported(String),

    #[error("Push transport error: {0}")]
    Transport(String),

    #[error("Handshake failed with status {status}: {body}")]
    HandshakeFailed { status: u16, body: String },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration batch {batch_id} rejected with status {status}: {body}")]
    ConfigurationRejected {
        batch_id: u64,
        status: u16,
        body: String,
    },

    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Connection has not been started; call connect() first")]
    NotStarted,

    #[error("Connection task is no longer running")]
    Closed,

    #[error("HTTP error: {0}")]
    Http(String),
}

impl ClientError {
    /// Whether the error is a caller programming error rather than a runtime condition
    pub fn is_usage_error(&self) -> bool {
        matches!(self, ClientError::MissingArgument(_) | ClientError::NotStarted)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

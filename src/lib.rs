// Shared components
pub mod config;
pub mod error;
pub mod metrics;

// Subscription model
pub mod dispatch;
pub mod filter;
pub mod subscription;

// Connection layer
pub mod connection;
pub mod health;
pub mod transport;

pub use config::Settings;
pub use connection::{ConnectionContext, ConnectionOptions, SseConnection};
pub use error::{ClientError, Result};
pub use filter::Filter;
pub use subscription::{SubscribeOptions, Subscriber};

//! Gateway connection lifecycle, handshake, batching and channel healing

mod actor;
mod client;
mod context;
mod types;

pub use client::SseConnection;
pub use context::ConnectionContext;
pub use types::{
    ConfigErrorHook, ConfigFailure, ConnectionOptions, ConnectionState, ConnectionStats,
    ConnectionStatusHandler, ErrorHandler, OnConnected, ReloadHook, SessionInfo,
};

//! Registry of live connections, keyed by client id

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Prefix for generated client ids
const CLIENT_ID_PREFIX: &str = "sse-client-";

/// Shared registry guaranteeing one live connection per client id.
///
/// Owned by the application's composition root and cloned into every
/// connection it creates.
#[derive(Clone, Default)]
pub struct ConnectionContext {
    inner: Arc<ContextInner>,
}

#[derive(Default)]
struct ContextInner {
    /// client_id -> instance token of the connection holding it
    connections: DashMap<String, u64>,
    next_client: AtomicU64,
    next_token: AtomicU64,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a client id (`sse-client-N`)
    pub fn next_client_id(&self) -> String {
        let n = self.inner.next_client.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", CLIENT_ID_PREFIX, n)
    }

    /// Allocate a token identifying one connection instance
    pub(crate) fn next_token(&self) -> u64 {
        self.inner.next_token.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Claim `client_id` for the connection identified by `token`.
    ///
    /// Succeeds if the id is free or already held by the same connection.
    pub(crate) fn claim(&self, client_id: &str, token: u64) -> bool {
        match self.inner.connections.entry(client_id.to_string()) {
            Entry::Occupied(entry) => *entry.get() == token,
            Entry::Vacant(entry) => {
                entry.insert(token);
                true
            }
        }
    }

    /// Release `client_id` if it is held by `token`
    pub(crate) fn release(&self, client_id: &str, token: u64) {
        self.inner
            .connections
            .remove_if(client_id, |_, holder| *holder == token);
    }

    pub fn is_registered(&self, client_id: &str) -> bool {
        self.inner.connections.contains_key(client_id)
    }

    /// Number of client ids currently held
    pub fn len(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.connections.is_empty()
    }
}

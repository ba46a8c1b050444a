//! In-memory per-tab storage

use dashmap::DashMap;

use super::TabStorage;

/// Tab storage that lives as long as the process.
///
/// Share one instance between connections that should see each other's
/// per-tab identities, e.g. across reconnects of the same logical tab.
#[derive(Debug, Default)]
pub struct MemoryTabStorage {
    entries: DashMap<String, String>,
}

impl MemoryTabStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TabStorage for MemoryTabStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }
}

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("no site identifier configured for the durable store")]
    MissingSiteId,

    #[error("invalid store URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("unexpected status {status} for key {key}")]
    UnexpectedStatus { key: String, status: u16 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal async string map. A missing key is `Ok(None)`, never an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process store. Not persistent across restarts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().insert(key.into(), value.into());
    }

    pub fn lookup(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// Copy of the full contents.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.data.read().clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.insert(key, value);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutils {
    use super::*;

    /// Backend that fails every call, standing in for an unreachable store.
    pub struct UnreachableStore;

    #[async_trait]
    impl KeyValueStore for UnreachableStore {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }
}

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use store::{KeyAliaser, KeyValueStore, MemoryStore, Storage, StoreError};

/// Durable store stand-in whose reads of chosen keys fail a set number of
/// times before succeeding.
#[derive(Default)]
pub struct FlakyStore {
    pub data: MemoryStore,
    failing_reads: Mutex<HashMap<String, usize>>,
}

impl FlakyStore {
    pub fn with(entries: &[(&str, &str)]) -> Self {
        let store = FlakyStore::default();
        for (key, value) in entries {
            store.data.insert(*key, *value);
        }
        store
    }

    pub fn fail_reads(&self, key: &str, times: usize) {
        self.failing_reads.lock().insert(key.to_string(), times);
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(remaining) = self.failing_reads.lock().get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Unavailable("connection reset".into()));
            }
        }
        Ok(self.data.lookup(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data.insert(key, value);
        Ok(())
    }
}

/// Storage backed by `durable`, with an empty in-process fallback.
pub fn durable_storage(durable: Arc<FlakyStore>) -> Storage {
    Storage::from_parts(
        Some(durable as Arc<dyn KeyValueStore>),
        Arc::new(MemoryStore::new()),
        KeyAliaser::default(),
    )
}

use crate::backend::{KeyValueStore, MemoryStore, StoreError};
use crate::blob::HttpBlobStore;
use crate::config::{Defaults, Environment, StoreConfig};
use crate::keys::KeyAliaser;
use crate::metrics_defs::{STORE_FALLBACK, STORE_WRITE_FAILED};
use crate::types::LogicalKey;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::counter;
use std::sync::Arc;

/// Which backend answered a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    /// The durable store.
    Durable,
    /// The in-process store, chosen by configuration.
    InProcess,
    /// The in-process store, because the durable store could not be built or
    /// failed during the call.
    Fallback,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Durable => "durable",
            Tier::InProcess => "in_process",
            Tier::Fallback => "fallback",
        }
    }

    pub fn environment_label(&self) -> &'static str {
        match self {
            Tier::Durable | Tier::Fallback => "production",
            Tier::InProcess => "local",
        }
    }
}

/// Result of probing an ordered list of candidate keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Probe {
    Found { key: String, raw: String, tier: Tier },
    NotFound { tier: Tier },
}

impl Probe {
    pub fn tier(&self) -> Tier {
        match self {
            Probe::Found { tier, .. } | Probe::NotFound { tier } => *tier,
        }
    }
}

struct StorageInner {
    durable: Option<Arc<dyn KeyValueStore>>,
    // Tier reported when the in-process store answers.
    local_tier: Tier,
    fallback: Arc<MemoryStore>,
    keys: KeyAliaser,
}

/// The store every component reads and writes through.
///
/// Calls go to the durable backend when there is one. Any durable error is
/// logged and the same call is answered by the in-process store, so callers
/// never see a storage failure.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

impl Storage {
    /// Resolves the backend once from configuration and environment. Never
    /// fails: a durable store that cannot be built leaves only the in-process
    /// store.
    pub fn connect(config: &StoreConfig, defaults: &Defaults, env: &dyn Environment) -> Self {
        let keys = KeyAliaser::new(config.namespace.clone());
        let fallback = Arc::new(seeded_memory_store(&keys, defaults));

        if !config.mode.wants_durable(env) {
            tracing::info!(mode = ?config.mode, "using in-process store");
            return Self::from_parts(None, fallback, keys);
        }

        match HttpBlobStore::new(&config.durable, env) {
            Ok(store) => {
                tracing::info!("using durable store");
                Self::from_parts(Some(Arc::new(store)), fallback, keys)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to create durable store, falling back to in-process store");
                counter!(STORE_FALLBACK, "op" => "connect").increment(1);
                Storage {
                    inner: Arc::new(StorageInner {
                        durable: None,
                        local_tier: Tier::Fallback,
                        fallback,
                        keys,
                    }),
                }
            }
        }
    }

    /// In-process only, seeded with `defaults`.
    pub fn in_process(keys: KeyAliaser, defaults: &Defaults) -> Self {
        let fallback = Arc::new(seeded_memory_store(&keys, defaults));
        Self::from_parts(None, fallback, keys)
    }

    pub fn from_parts(
        durable: Option<Arc<dyn KeyValueStore>>,
        fallback: Arc<MemoryStore>,
        keys: KeyAliaser,
    ) -> Self {
        let local_tier = if durable.is_some() {
            Tier::Fallback
        } else {
            Tier::InProcess
        };

        Storage {
            inner: Arc::new(StorageInner {
                durable,
                local_tier,
                fallback,
                keys,
            }),
        }
    }

    /// The tier calls are expected to hit.
    pub fn tier(&self) -> Tier {
        match self.inner.durable {
            Some(_) => Tier::Durable,
            None => self.inner.local_tier,
        }
    }

    pub fn keys(&self) -> &KeyAliaser {
        &self.inner.keys
    }

    pub fn local(&self) -> &MemoryStore {
        &self.inner.fallback
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(durable) = &self.inner.durable {
            match durable.get(key).await {
                Ok(value) => return value,
                Err(err) => self.log_fallback("get", key, &err),
            }
        }
        self.inner.fallback.lookup(key)
    }

    pub async fn set(&self, key: &str, value: &str) -> bool {
        if let Some(durable) = &self.inner.durable {
            match durable.set(key, value).await {
                Ok(()) => return true,
                Err(err) => self.log_fallback("set", key, &err),
            }
        }
        self.inner.fallback.insert(key, value);
        true
    }

    /// Reads the canonical key of `key` as JSON. Missing or unparsable values
    /// are `None`.
    pub async fn read_json<T: DeserializeOwned>(&self, key: &LogicalKey) -> Option<T> {
        let physical = self.inner.keys.primary(key);
        let raw = self.get(&physical).await?;
        parse_stored(&physical, &raw)
    }

    /// Like [`Storage::read_json`], but a durable error is returned instead of
    /// being answered from the in-process store. Writers that rebuild a value
    /// from what is stored use this so a transient failure never stands in
    /// for the real baseline.
    pub async fn try_read_json<T: DeserializeOwned>(
        &self,
        key: &LogicalKey,
    ) -> Result<Option<T>, StoreError> {
        let physical = self.inner.keys.primary(key);
        let raw = match &self.inner.durable {
            Some(durable) => durable.get(&physical).await?,
            None => self.inner.fallback.lookup(&physical),
        };
        Ok(raw.and_then(|raw| parse_stored(&physical, &raw)))
    }

    /// Writes `value` under every physical alias of `key`. Returns true only
    /// if every alias was written.
    pub async fn write_json<T: Serialize + ?Sized>(&self, key: &LogicalKey, value: &T) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::error!(%key, error = %err, "failed to encode value");
                counter!(STORE_WRITE_FAILED).increment(1);
                return false;
            }
        };

        let mut ok = true;
        for physical in self.inner.keys.write_keys(key) {
            ok &= self.set(&physical, &encoded).await;
        }
        if !ok {
            counter!(STORE_WRITE_FAILED).increment(1);
        }
        ok
    }

    /// Tries `candidates` in order and stops at the first hit.
    ///
    /// A durable error abandons the durable attempt and re-probes all
    /// candidates against the in-process store.
    pub async fn probe(&self, candidates: &[String]) -> Probe {
        if let Some(durable) = &self.inner.durable {
            match probe_backend(durable.as_ref(), candidates).await {
                Ok(Some((key, raw))) => {
                    return Probe::Found {
                        key,
                        raw,
                        tier: Tier::Durable,
                    };
                }
                Ok(None) => return Probe::NotFound { tier: Tier::Durable },
                Err(err) => self.log_fallback("probe", &candidates.join(","), &err),
            }
        }

        let local_tier = match self.inner.durable {
            Some(_) => Tier::Fallback,
            None => self.inner.local_tier,
        };
        let found = candidates
            .iter()
            .find_map(|key| self.inner.fallback.lookup(key).map(|raw| (key.clone(), raw)));

        match found {
            Some((key, raw)) => Probe::Found {
                key,
                raw,
                tier: local_tier,
            },
            None => Probe::NotFound { tier: local_tier },
        }
    }

    fn log_fallback(&self, op: &'static str, key: &str, err: &StoreError) {
        tracing::warn!(op, key, error = %err, "durable store call failed, using in-process store");
        counter!(STORE_FALLBACK, "op" => op).increment(1);
    }
}

fn parse_stored<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, error = %err, "ignoring unparsable stored value");
            None
        }
    }
}

async fn probe_backend(
    store: &dyn KeyValueStore,
    candidates: &[String],
) -> Result<Option<(String, String)>, StoreError> {
    for key in candidates {
        tracing::debug!(store = store.name(), %key, "probing key");
        if let Some(raw) = store.get(key).await? {
            return Ok(Some((key.clone(), raw)));
        }
    }
    Ok(None)
}

/// In-process store holding the default list, mappings, package data and a
/// startup timestamp under every alias.
fn seeded_memory_store(keys: &KeyAliaser, defaults: &Defaults) -> MemoryStore {
    let store = MemoryStore::new();
    let seed = |key: LogicalKey, encoded: serde_json::Result<String>| match encoded {
        Ok(encoded) => {
            for physical in keys.write_keys(&key) {
                store.insert(physical, encoded.clone());
            }
        }
        Err(err) => tracing::error!(%key, error = %err, "failed to encode default value"),
    };

    seed(LogicalKey::PackageList, serde_json::to_string(&defaults.packages));
    seed(LogicalKey::RepoMappings, serde_json::to_string(&defaults.repo_mappings));
    seed(LogicalKey::PackageData, serde_json::to_string(&defaults.package_data));
    seed(LogicalKey::LastUpdated, serde_json::to_string(&Utc::now()));
    for (package, record) in &defaults.package_data {
        seed(
            LogicalKey::Package(package.clone()),
            serde_json::to_string(record),
        );
    }

    store
}

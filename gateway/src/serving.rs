//! Read path for package data.
//!
//! Physical keys are probed in precedence order so readers keep working when
//! writers spell keys differently. A store that fails mid-lookup is answered
//! from the in-process store and labeled as such.

use crate::metrics_defs::PROBE_OUTCOME;
use serde::Serialize;
use serde_json::{Map, Value};
use shared::counter;
use store::types::{GITHUB_FIELD, LogicalKey};
use store::{Probe, Storage, Tier};

/// A successful lookup with its freshness markers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageView {
    pub data: Value,
    pub last_updated: Option<Value>,
    pub github_last_updated: Option<Value>,
    pub environment: &'static str,
    pub access_method: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Found(PackageView),
    /// No candidate key held data. Distinct from the store being unavailable,
    /// which is answered from the fallback tier instead.
    NotFound {
        package: Option<String>,
        environment: &'static str,
        access_method: String,
    },
}

#[derive(Clone)]
pub struct ServingGateway {
    storage: Storage,
    merge_github_inline: bool,
}

impl ServingGateway {
    pub fn new(storage: Storage, merge_github_inline: bool) -> Self {
        ServingGateway {
            storage,
            merge_github_inline,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Resolves one package, or the whole aggregate when `package` is `None`.
    pub async fn resolve(&self, package: Option<&str>) -> Resolution {
        let key = match package {
            Some(name) => LogicalKey::Package(name.to_string()),
            None => LogicalKey::PackageData,
        };
        let candidates = self.storage.keys().read_candidates(&key);

        let (found_key, raw, tier) = match self.storage.probe(&candidates).await {
            Probe::Found { key, raw, tier } => (key, raw, tier),
            Probe::NotFound { tier } => {
                counter!(PROBE_OUTCOME, "outcome" => "not_found", "tier" => tier.as_str())
                    .increment(1);
                tracing::debug!(%key, ?tier, "no data under any key spelling");
                return Resolution::NotFound {
                    package: package.map(String::from),
                    environment: tier.environment_label(),
                    access_method: not_found_label(tier).to_string(),
                };
            }
        };

        counter!(PROBE_OUTCOME, "outcome" => "found", "tier" => tier.as_str()).increment(1);
        tracing::debug!(key = %found_key, ?tier, "found package data");

        let mut data = decode_payload(&raw);
        if self.merge_github_inline {
            self.attach_github(package, &mut data).await;
        }

        Resolution::Found(PackageView {
            data,
            last_updated: self.lookup(&LogicalKey::LastUpdated).await,
            github_last_updated: self.lookup(&LogicalKey::GithubLastUpdated).await,
            environment: tier.environment_label(),
            access_method: access_label(tier, &found_key),
        })
    }

    async fn lookup(&self, key: &LogicalKey) -> Option<Value> {
        let candidates = self.storage.keys().read_candidates(key);
        match self.storage.probe(&candidates).await {
            Probe::Found { raw, .. } => Some(decode_payload(&raw)),
            Probe::NotFound { .. } => None,
        }
    }

    // Records written before the stats ingestor last reconciled have no
    // `github` field; take it from the raw batch instead.
    async fn attach_github(&self, package: Option<&str>, data: &mut Value) {
        let Some(Value::Object(github)) = self.lookup(&LogicalKey::GithubData).await else {
            return;
        };

        match package {
            Some(name) => attach_one(data, github.get(name)),
            None => {
                if let Value::Object(records) = data {
                    for (name, record) in records.iter_mut() {
                        attach_one(record, github.get(name));
                    }
                }
            }
        }
    }
}

fn attach_one(record: &mut Value, stats: Option<&Value>) {
    let (Value::Object(fields), Some(stats)) = (record, stats) else {
        return;
    };
    if fields.get(GITHUB_FIELD).is_none_or(Value::is_null) {
        fields.insert(GITHUB_FIELD.to_string(), stats.clone());
    }
}

/// Parses a stored string as JSON, unwrapping a `{"value": ...}` envelope.
/// Anything that does not parse is passed through as a string.
pub fn decode_payload(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => unwrap_envelope(value),
        Err(_) => Value::String(raw.to_string()),
    }
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if is_envelope(&map) => match map.remove("value") {
            Some(Value::String(inner)) => {
                serde_json::from_str(&inner).unwrap_or(Value::String(inner))
            }
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    }
}

fn is_envelope(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.contains_key("value")
}

fn access_label(tier: Tier, key: &str) -> String {
    match tier {
        Tier::Durable => format!("kv-with-key-{key}"),
        Tier::InProcess => format!("memory-with-key-{key}"),
        Tier::Fallback => "localCacheFallback".to_string(),
    }
}

fn not_found_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Durable => "kv",
        Tier::InProcess => "memory",
        Tier::Fallback => "localCacheFallback",
    }
}

//! Expands logical keys into the physical keys written and probed in the store.
//!
//! Writers and readers deployed independently have historically disagreed on
//! key spelling, so every logical entity lives under a bare key and a
//! namespace-prefixed key. Readers additionally try a slash-separated spelling.

use crate::types::LogicalKey;

pub const DEFAULT_NAMESPACE: &str = "package-scores";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyAliaser {
    namespace: String,
}

impl KeyAliaser {
    pub fn new(namespace: impl Into<String>) -> Self {
        KeyAliaser {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The key writers consider canonical and readers on the write side use.
    pub fn primary(&self, key: &LogicalKey) -> String {
        key.as_key()
    }

    /// Every physical key a write of `key` must touch, bare key first.
    pub fn write_keys(&self, key: &LogicalKey) -> Vec<String> {
        let bare = key.as_key();
        let namespaced = format!("{}:{bare}", self.namespace);
        vec![bare, namespaced]
    }

    /// Spellings a reader probes for `key`, in precedence order.
    pub fn read_candidates(&self, key: &LogicalKey) -> Vec<String> {
        let bare = key.as_key();
        vec![
            format!("{}:{bare}", self.namespace),
            bare.clone(),
            format!("{}/{bare}", self.namespace),
        ]
    }
}

impl Default for KeyAliaser {
    fn default() -> Self {
        KeyAliaser::new(DEFAULT_NAMESPACE)
    }
}

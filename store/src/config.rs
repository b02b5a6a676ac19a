use crate::keys::DEFAULT_NAMESPACE;
use crate::types::{PackageData, PackageList, RepoMappings};
use serde::Deserialize;
use std::collections::HashMap;

/// How the store backend is chosen at startup.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Durable when the process environment looks like a deployment.
    #[default]
    Auto,
    Durable,
    Memory,
}

impl StoreMode {
    pub fn wants_durable(&self, env: &dyn Environment) -> bool {
        match self {
            StoreMode::Durable => true,
            StoreMode::Memory => false,
            StoreMode::Auto => {
                env.var("NETLIFY").as_deref() == Some("true")
                    || env.var("DEPLOY_URL").is_some_and(|v| !v.is_empty())
                    || env.var("SITE_ID").is_some_and(|v| !v.is_empty())
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DurableStoreConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_store_name")]
    pub store_name: String,
    /// Falls back to `SITE_ID` from the environment.
    pub site_id: Option<String>,
    /// Falls back to `NETLIFY_AUTH_TOKEN`, then `NETLIFY_API_TOKEN`.
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DurableStoreConfig {
    fn default() -> Self {
        DurableStoreConfig {
            api_url: default_api_url(),
            store_name: default_store_name(),
            site_id: None,
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default)]
    pub mode: StoreMode,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub durable: DurableStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            mode: StoreMode::default(),
            namespace: default_namespace(),
            durable: DurableStoreConfig::default(),
        }
    }
}

/// Values the registry falls back to and the in-process store is seeded with.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Defaults {
    pub packages: PackageList,
    pub repo_mappings: RepoMappings,
    pub package_data: PackageData,
}

impl Default for Defaults {
    fn default() -> Self {
        const TRACKED: &[(&str, &str)] = &[
            ("showcaseview", "simformsolutions/flutter_showcaseview"),
            ("chatview", "SimformSolutionsPvtLtd/chatview"),
            ("calendar_view", "SimformSolutionsPvtLtd/flutter_calendar_view"),
            ("flutter_credit_card", "SimformSolutionsPvtLtd/flutter_credit_card"),
            ("audio_waveforms", "SimformSolutionsPvtLtd/audio_waveforms"),
            ("chatview_connect", "SimformSolutionsPvtLtd/chatview_connect"),
            ("splash_master", "SimformSolutionsPvtLtd/splash_master"),
        ];

        Defaults {
            packages: TRACKED.iter().map(|(package, _)| *package).collect(),
            repo_mappings: TRACKED.iter().copied().collect(),
            package_data: PackageData::new(),
        }
    }
}

/// Source of process environment variables, injectable for tests.
pub trait Environment: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.into()
}

fn default_api_url() -> String {
    "https://api.netlify.com/api/v1/blobs".into()
}

fn default_store_name() -> String {
    DEFAULT_NAMESPACE.into()
}

fn default_timeout_secs() -> u64 {
    10
}

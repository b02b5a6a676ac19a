use gateway::config::{GatewayConfig, Listener};
use ingest::config::{ScheduleConfig, UpstreamConfig};
use serde::Deserialize;
use std::fs::File;
use store::config::{Defaults, StoreConfig};

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub upstreams: UpstreamConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default = "default_listener")]
    pub listener: Listener,
    pub admin_listener: Option<Listener>,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listener.validate()?;
        if let Some(admin) = &self.admin_listener {
            admin.validate()?;
        }
        self.upstreams.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            common: CommonConfig::default(),
            store: StoreConfig::default(),
            defaults: Defaults::default(),
            upstreams: UpstreamConfig::default(),
            schedule: ScheduleConfig::default(),
            listener: default_listener(),
            admin_listener: None,
            gateway: GatewayConfig::default(),
        }
    }
}

fn default_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3000,
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid listener: {0}")]
    InvalidListener(#[from] gateway::config::ValidationError),
    #[error("invalid ingestion settings: {0}")]
    InvalidIngest(#[from] ingest::config::ValidationError),
}

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Read path behavior.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Attach stored repository stats to records that lack them at read time.
    pub merge_github_inline: bool,
    /// `max-age` for package data responses.
    pub data_max_age_secs: u64,
    /// `max-age` for package list and mapping listings.
    pub list_max_age_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            merge_github_inline: true,
            data_max_age_secs: 60,
            list_max_age_secs: 300,
        }
    }
}

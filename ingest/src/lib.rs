//! Scheduled writers that pull package metrics from upstream sources.
//!
//! [`ScoreIngestor`] owns the registry score portion of every record,
//! [`StatsIngestor`] owns the `github` sub-object and persists it through
//! [`reconciler`]. Neither ever erases the other's fields.

pub mod config;
mod fanout;
pub mod fetch;
pub mod metrics_defs;
pub mod reconciler;
pub mod scheduler;
pub mod score;
pub mod stats;
#[cfg(test)]
mod testutils;

pub use fetch::{FetchError, GithubClient, PubDevClient, RepoStats, RepoStatsFetcher, ScoreFetcher};
pub use score::ScoreIngestor;
pub use stats::StatsIngestor;

use serde::Serialize;

/// Summary of one ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Packages whose data was fetched and persisted.
    pub updated: usize,
    /// Packages whose fetch failed or timed out.
    pub failed: usize,
    /// Packages with nothing to fetch, such as a missing repo mapping.
    pub skipped: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("another {0} run is in progress")]
    AlreadyRunning(&'static str),

    /// The stored records could not be read, so nothing may be rebuilt from
    /// them in this run.
    #[error("could not read stored package data: {0}")]
    BaselineUnavailable(#[source] store::StoreError),
}

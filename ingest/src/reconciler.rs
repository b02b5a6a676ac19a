//! Attaches repository stats to stored package records.
//!
//! Only the `github` sub-object of a record is ever replaced; every other
//! field of the baseline record is carried over untouched.

use chrono::{DateTime, Utc};
use store::Storage;
use store::types::{GithubBatch, LogicalKey, PackageData};

/// Shallow-merges `batch` into `baseline`.
///
/// Packages in `batch` without a baseline record are left out, there is
/// nothing to attach them to. The raw batch is persisted separately by
/// [`apply`] so they can be reattached later.
pub fn merge(batch: &GithubBatch, baseline: &PackageData) -> PackageData {
    let mut merged = baseline.clone();

    for (package, stats) in batch {
        let Some(record) = merged.get_mut(package) else {
            continue;
        };
        match serde_json::to_value(stats) {
            Ok(github) => record.set_github(github),
            Err(e) => tracing::error!(%package, error = %e, "failed to encode repo stats"),
        }
    }

    merged
}

/// Persists `batch` and its merge into `baseline`. Returns whether every
/// write succeeded.
///
/// The result depends only on the arguments, so repeating a call with the
/// same inputs leaves the store unchanged.
pub async fn apply(
    storage: &Storage,
    batch: &GithubBatch,
    baseline: &PackageData,
    now: DateTime<Utc>,
) -> bool {
    let mut ok = storage.write_json(&LogicalKey::GithubData, batch).await;

    let merged = merge(batch, baseline);
    for package in batch.keys() {
        if let Some(record) = merged.get(package) {
            ok &= storage
                .write_json(&LogicalKey::Package(package.clone()), record)
                .await;
        }
    }

    ok &= storage.write_json(&LogicalKey::PackageData, &merged).await;
    ok &= storage
        .write_json(&LogicalKey::GithubLastUpdated, &now)
        .await;

    tracing::info!(
        batch = batch.len(),
        merged = batch.keys().filter(|p| baseline.contains_key(*p)).count(),
        ok,
        "reconciled repository stats"
    );
    ok
}

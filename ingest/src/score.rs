use crate::config::UpstreamConfig;
use crate::fanout::fetch_all;
use crate::fetch::{FetchError, ScoreFetcher};
use crate::metrics_defs::{FETCH_FAILURE, FETCH_SUCCESS, RUN_DURATION};
use crate::{IngestError, IngestReport};
use chrono::Utc;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::ConfigRegistry;
use store::types::{LogicalKey, PackageData, PackageRecord};
use tokio::sync::Semaphore;

/// Fetches registry scores for every tracked package and persists them.
pub struct ScoreIngestor {
    registry: ConfigRegistry,
    fetcher: Arc<dyn ScoreFetcher>,
    concurrency: usize,
    timeout: Duration,
    // Held for the duration of a run so runs never overlap.
    run_lock: Semaphore,
}

impl ScoreIngestor {
    pub fn new(
        registry: ConfigRegistry,
        fetcher: Arc<dyn ScoreFetcher>,
        upstreams: &UpstreamConfig,
    ) -> Self {
        ScoreIngestor {
            registry,
            fetcher,
            concurrency: upstreams.concurrency,
            timeout: upstreams.timeout(),
            run_lock: Semaphore::new(1),
        }
    }

    /// One ingestion pass.
    ///
    /// A package whose fetch fails keeps its previous entry in the aggregate.
    /// A `github` sub-object already stored for a package survives the
    /// rewrite. When nothing could be fetched, stored state is left alone.
    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        let _permit = self
            .run_lock
            .try_acquire()
            .map_err(|_| IngestError::AlreadyRunning("scores"))?;
        let started = Instant::now();
        let storage = self.registry.storage();

        let packages = self.registry.package_list().await;
        let packages = packages.unique();
        let baseline: PackageData = storage
            .try_read_json(&LogicalKey::PackageData)
            .await
            .map_err(IngestError::BaselineUnavailable)?
            .unwrap_or_default();

        tracing::info!(packages = packages.len(), "fetching registry scores");

        let fetcher = self.fetcher.clone();
        let mut results = fetch_all(
            packages.iter().map(|p| (p.to_string(), p.to_string())).collect(),
            self.concurrency,
            self.timeout,
            move |package| {
                let fetcher = fetcher.clone();
                async move { fetcher.fetch_score(&package).await }
            },
        )
        .await;

        let mut report = IngestReport::default();
        let mut aggregate = PackageData::new();
        let mut fresh = Vec::new();

        for package in packages {
            let fetched = results
                .remove(package)
                .unwrap_or(Err(FetchError::Aborted))
                .and_then(|value| {
                    PackageRecord::try_from(value)
                        .map_err(|e| FetchError::InvalidPayload(e.to_string()))
                });

            match fetched {
                Ok(mut record) => {
                    counter!(FETCH_SUCCESS, "source" => "score").increment(1);
                    tracing::debug!(%package, "fetched registry score");

                    if !record.has_github() {
                        let previous = baseline.get(package).filter(|p| p.has_github());
                        if let Some(github) = previous.and_then(PackageRecord::github) {
                            record.set_github(github.clone());
                        }
                    }
                    report.updated += 1;
                    fresh.push(package.clone());
                    aggregate.insert(package.clone(), record);
                }
                Err(e) => {
                    counter!(FETCH_FAILURE, "source" => "score").increment(1);
                    tracing::warn!(%package, error = %e, "failed to fetch registry score");
                    report.failed += 1;
                    if let Some(previous) = baseline.get(package) {
                        aggregate.insert(package.clone(), previous.clone());
                    }
                }
            }
        }

        if report.updated == 0 {
            tracing::warn!(failed = report.failed, "no registry scores fetched, keeping stored data");
        } else {
            self.persist(&aggregate, &fresh).await;
        }

        histogram!(RUN_DURATION, "ingestor" => "scores").record(started.elapsed().as_secs_f64());
        tracing::info!(
            updated = report.updated,
            failed = report.failed,
            "registry score run finished"
        );
        Ok(report)
    }

    async fn persist(&self, aggregate: &PackageData, fresh: &[String]) {
        let storage = self.registry.storage();
        let mut ok = true;

        for package in fresh {
            if let Some(record) = aggregate.get(package) {
                ok &= storage
                    .write_json(&LogicalKey::Package(package.clone()), record)
                    .await;
            }
        }
        ok &= storage.write_json(&LogicalKey::PackageData, aggregate).await;
        ok &= storage
            .write_json(&LogicalKey::LastUpdated, &Utc::now())
            .await;

        if !ok {
            tracing::error!("failed to persist some registry score data");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testutils::FakeScores;
    use crate::testutils::{FlakyStore, durable_storage};
    use serde_json::{Value, json};
    use store::config::Defaults;
    use store::types::PackageList;
    use store::{KeyAliaser, Storage};

    async fn registry_with(packages: &[&str]) -> ConfigRegistry {
        let storage = Storage::in_process(KeyAliaser::default(), &Defaults::default());
        let registry = ConfigRegistry::new(storage, Defaults::default());
        let list: PackageList = packages.iter().copied().collect();
        assert!(registry.update_package_list(&list).await);
        registry
    }

    fn ingestor(registry: &ConfigRegistry, fetcher: Arc<FakeScores>) -> ScoreIngestor {
        ScoreIngestor::new(registry.clone(), fetcher, &UpstreamConfig::default())
    }

    #[tokio::test]
    async fn test_stores_exact_score_payload() {
        let registry = registry_with(&["foo"]).await;
        let fetcher = Arc::new(FakeScores::with(&[("foo", json!({"grantedPoints": 10}))]));

        let report = ingestor(&registry, fetcher).run().await.unwrap();
        assert_eq!(
            report,
            IngestReport {
                updated: 1,
                failed: 0,
                skipped: 0
            }
        );

        let storage = registry.storage();
        for key in ["package-foo", "package-scores:package-foo"] {
            let raw = storage.get(key).await.unwrap();
            assert_eq!(
                serde_json::from_str::<Value>(&raw).unwrap(),
                json!({"grantedPoints": 10})
            );
        }

        let all: Value = storage.read_json(&LogicalKey::PackageData).await.unwrap();
        assert_eq!(all, json!({"foo": {"grantedPoints": 10}}));
        assert!(storage.get("package-scores:last-updated").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_package_does_not_abort_batch() {
        let registry = registry_with(&["foo", "broken", "bar"]).await;
        let fetcher = Arc::new(FakeScores::with(&[
            ("foo", json!({"grantedPoints": 10})),
            ("bar", json!({"grantedPoints": 20})),
        ]));

        let report = ingestor(&registry, fetcher.clone()).run().await.unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(fetcher.calls.count(), 3);

        let all: PackageData = registry
            .storage()
            .read_json(&LogicalKey::PackageData)
            .await
            .unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), ["bar", "foo"]);
    }

    #[tokio::test]
    async fn test_keeps_previous_entry_and_github() {
        let registry = registry_with(&["foo", "bar"]).await;
        let previous: PackageData = serde_json::from_value(json!({
            "foo": {"grantedPoints": 1, "github": {"stars": 5}},
            "bar": {"grantedPoints": 2},
        }))
        .unwrap();
        assert!(
            registry
                .storage()
                .write_json(&LogicalKey::PackageData, &previous)
                .await
        );

        let fetcher = Arc::new(FakeScores::with(&[("foo", json!({"grantedPoints": 10}))]));
        ingestor(&registry, fetcher).run().await.unwrap();

        let all: Value = registry
            .storage()
            .read_json(&LogicalKey::PackageData)
            .await
            .unwrap();
        assert_eq!(
            all,
            json!({
                "foo": {"grantedPoints": 10, "github": {"stars": 5}},
                "bar": {"grantedPoints": 2},
            })
        );
    }

    #[tokio::test]
    async fn test_nothing_fetched_leaves_store_alone() {
        let registry = registry_with(&["foo"]).await;
        let before = registry.storage().local().snapshot();

        let report = ingestor(&registry, Arc::new(FakeScores::default()))
            .run()
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(registry.storage().local().snapshot(), before);
    }

    #[tokio::test]
    async fn test_non_object_payload_is_a_failure() {
        let registry = registry_with(&["foo", "bar"]).await;
        let fetcher = Arc::new(FakeScores::with(&[
            ("foo", json!([1, 2, 3])),
            ("bar", json!({"grantedPoints": 20})),
        ]));

        let report = ingestor(&registry, fetcher).run().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, 1);
        assert!(registry.storage().get("package-foo").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_names_fetched_once() {
        let registry = registry_with(&["foo", "foo"]).await;
        let fetcher = Arc::new(FakeScores::with(&[("foo", json!({"grantedPoints": 10}))]));

        let report = ingestor(&registry, fetcher.clone()).run().await.unwrap();
        assert_eq!(fetcher.calls.count(), 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_unreadable_baseline_aborts_without_writing() {
        let durable = Arc::new(FlakyStore::with(&[
            ("package-list", r#"["foo","bar"]"#),
            (
                "package-data",
                r#"{"foo":{"grantedPoints":1,"github":{"stars":5}},"bar":{"grantedPoints":2}}"#,
            ),
        ]));
        durable.fail_reads("package-data", 1);
        let registry = ConfigRegistry::new(durable_storage(durable.clone()), Defaults::default());
        let fetcher = Arc::new(FakeScores::with(&[("foo", json!({"grantedPoints": 10}))]));
        let ingestor = ingestor(&registry, fetcher.clone());

        let before = durable.data.snapshot();
        assert!(matches!(
            ingestor.run().await,
            Err(IngestError::BaselineUnavailable(_))
        ));
        assert_eq!(fetcher.calls.count(), 0);
        assert_eq!(durable.data.snapshot(), before);

        // the next run sees the real baseline again
        ingestor.run().await.unwrap();
        let all: Value = serde_json::from_str(&durable.data.lookup("package-data").unwrap()).unwrap();
        assert_eq!(
            all,
            json!({
                "foo": {"grantedPoints": 10, "github": {"stars": 5}},
                "bar": {"grantedPoints": 2},
            })
        );
    }
}

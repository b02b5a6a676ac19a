use crate::config::UpstreamConfig;
use crate::fanout::fetch_all;
use crate::fetch::RepoStatsFetcher;
use crate::metrics_defs::{FETCH_FAILURE, FETCH_SUCCESS, RUN_DURATION};
use crate::reconciler;
use crate::{IngestError, IngestReport};
use chrono::Utc;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::ConfigRegistry;
use store::types::{GithubBatch, GithubStats, LogicalKey, PackageData};
use tokio::sync::Semaphore;

/// Fetches repository stats for every mapped package and merges them into
/// the stored records.
pub struct StatsIngestor {
    registry: ConfigRegistry,
    fetcher: Arc<dyn RepoStatsFetcher>,
    concurrency: usize,
    timeout: Duration,
    run_lock: Semaphore,
}

impl StatsIngestor {
    pub fn new(
        registry: ConfigRegistry,
        fetcher: Arc<dyn RepoStatsFetcher>,
        upstreams: &UpstreamConfig,
    ) -> Self {
        StatsIngestor {
            registry,
            fetcher,
            concurrency: upstreams.concurrency,
            timeout: upstreams.timeout(),
            run_lock: Semaphore::new(1),
        }
    }

    /// One ingestion pass. Returns the report and the batch that was
    /// persisted.
    ///
    /// Packages without a repo mapping are skipped. The baseline is read
    /// before fetching, so a score run landing in between is overwritten in
    /// the aggregate until its next run.
    pub async fn run(&self) -> Result<(IngestReport, GithubBatch), IngestError> {
        let _permit = self
            .run_lock
            .try_acquire()
            .map_err(|_| IngestError::AlreadyRunning("stats"))?;
        let started = Instant::now();
        let storage = self.registry.storage();

        let packages = self.registry.package_list().await;
        let mappings = self.registry.repo_mappings().await;
        let baseline: PackageData = storage
            .try_read_json(&LogicalKey::PackageData)
            .await
            .map_err(IngestError::BaselineUnavailable)?
            .unwrap_or_default();

        tracing::info!(packages = packages.len(), "fetching repository stats");

        let mut report = IngestReport::default();
        let mut items = Vec::new();
        for package in packages.unique() {
            match mappings.get(package) {
                Some(repo) => items.push((package.clone(), repo.to_string())),
                None => {
                    tracing::info!(%package, "no repository mapping, skipping");
                    report.skipped += 1;
                }
            }
        }

        let fetcher = self.fetcher.clone();
        let results = fetch_all(items, self.concurrency, self.timeout, move |repo| {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_repo_stats(&repo).await }
        })
        .await;

        let mut batch = GithubBatch::new();
        for (package, result) in results {
            match result {
                Ok(stats) => {
                    counter!(FETCH_SUCCESS, "source" => "github").increment(1);
                    tracing::debug!(%package, stars = stats.stargazers_count, "fetched repository stats");
                    report.updated += 1;
                    batch.insert(
                        package,
                        GithubStats {
                            stars: stats.stargazers_count,
                            forks: stats.forks_count,
                            issues: stats.open_issues_count,
                            watchers: stats.watchers_count,
                            updated_at: Utc::now(),
                        },
                    );
                }
                Err(e) => {
                    counter!(FETCH_FAILURE, "source" => "github").increment(1);
                    tracing::warn!(%package, error = %e, "failed to fetch repository stats");
                    report.failed += 1;
                }
            }
        }

        if batch.is_empty() {
            tracing::warn!(failed = report.failed, "no repository stats fetched, keeping stored data");
        } else if !reconciler::apply(storage, &batch, &baseline, Utc::now()).await {
            tracing::error!("failed to persist some repository stats");
        }

        histogram!(RUN_DURATION, "ingestor" => "stats").record(started.elapsed().as_secs_f64());
        tracing::info!(
            updated = report.updated,
            failed = report.failed,
            skipped = report.skipped,
            "repository stats run finished"
        );
        Ok((report, batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScoreIngestor;
    use crate::fetch::testutils::{FakeRepos, FakeScores};
    use crate::testutils::{FlakyStore, durable_storage};
    use serde_json::{Value, json};
    use store::config::Defaults;
    use store::types::{PackageList, RepoMappings};
    use store::{KeyAliaser, Storage};

    async fn registry(packages: &[&str], mappings: &[(&str, &str)]) -> ConfigRegistry {
        let storage = Storage::in_process(KeyAliaser::default(), &Defaults::default());
        let registry = ConfigRegistry::new(storage, Defaults::default());
        let list: PackageList = packages.iter().copied().collect();
        let mappings: RepoMappings = mappings.iter().copied().collect();
        assert!(registry.update_package_list(&list).await);
        assert!(registry.update_repo_mappings(&mappings).await);
        registry
    }

    fn stats_ingestor(registry: &ConfigRegistry, fetcher: FakeRepos) -> StatsIngestor {
        StatsIngestor::new(registry.clone(), Arc::new(fetcher), &UpstreamConfig::default())
    }

    async fn stored(registry: &ConfigRegistry, key: &str) -> Value {
        let raw = registry.storage().get(key).await.unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_scores_then_stats() {
        let registry = registry(&["foo"], &[("foo", "org/foo")]).await;

        let scores = FakeScores::with(&[("foo", json!({"grantedPoints": 10}))]);
        ScoreIngestor::new(registry.clone(), Arc::new(scores), &UpstreamConfig::default())
            .run()
            .await
            .unwrap();
        assert_eq!(stored(&registry, "package-foo").await, json!({"grantedPoints": 10}));

        let (report, batch) = stats_ingestor(&registry, FakeRepos::with(&[("org/foo", 5)]))
            .run()
            .await
            .unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(batch["foo"].stars, 5);

        for key in ["package-foo", "package-scores:package-foo"] {
            let record = stored(&registry, key).await;
            assert_eq!(record["grantedPoints"], 10);
            assert_eq!(record["github"]["stars"], 5);
            assert_eq!(record["github"]["forks"], 2);
            assert_eq!(record["github"]["issues"], 1);
            assert_eq!(record["github"]["watchers"], 5);
            assert!(record["github"]["updatedAt"].is_string());
        }
        assert_eq!(
            stored(&registry, "package-data").await["foo"]["grantedPoints"],
            10
        );
        assert!(registry.storage().get("github-last-updated").await.is_some());
    }

    #[tokio::test]
    async fn test_registry_fields_untouched() {
        let registry = registry(&["foo"], &[("foo", "org/foo")]).await;
        let record = json!({
            "grantedPoints": 130,
            "maxPoints": 160,
            "likeCount": 42,
            "tags": ["sdk:flutter"],
        });
        assert!(
            registry
                .storage()
                .write_json(&LogicalKey::PackageData, &json!({"foo": record.clone()}))
                .await
        );

        stats_ingestor(&registry, FakeRepos::with(&[("org/foo", 9)]))
            .run()
            .await
            .unwrap();

        let mut stored = stored(&registry, "package-foo").await;
        assert_eq!(stored["github"]["stars"], 9);
        stored.as_object_mut().unwrap().remove("github");
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_unmapped_and_failing_packages() {
        let registry = registry(
            &["foo", "unmapped", "broken"],
            &[("foo", "org/foo"), ("broken", "org/broken")],
        )
        .await;
        let fetcher = FakeRepos::with(&[("org/foo", 5)]);

        let (report, batch) = stats_ingestor(&registry, fetcher).run().await.unwrap();
        assert_eq!(
            report,
            IngestReport {
                updated: 1,
                failed: 1,
                skipped: 1
            }
        );
        assert_eq!(batch.keys().collect::<Vec<_>>(), ["foo"]);
        assert_eq!(stored(&registry, "github-data").await["foo"]["stars"], 5);
    }

    #[tokio::test]
    async fn test_empty_batch_keeps_previous_github_data() {
        let registry = registry(&["foo"], &[("foo", "org/foo")]).await;
        registry.storage().set("github-data", r#"{"foo":{"stars":1}}"#).await;

        let (report, _) = stats_ingestor(&registry, FakeRepos::default())
            .run()
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(stored(&registry, "github-data").await["foo"]["stars"], 1);
    }

    #[tokio::test]
    async fn test_duplicate_names_fetched_and_skipped_once() {
        let registry = registry(&["foo", "foo", "bar", "bar"], &[("foo", "org/foo")]).await;
        let fetcher = Arc::new(FakeRepos::with(&[("org/foo", 5)]));
        let ingestor =
            StatsIngestor::new(registry.clone(), fetcher.clone(), &UpstreamConfig::default());

        let (report, batch) = ingestor.run().await.unwrap();
        assert_eq!(fetcher.calls.count(), 1);
        assert_eq!(
            report,
            IngestReport {
                updated: 1,
                failed: 0,
                skipped: 1
            }
        );
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_baseline_keeps_stored_records() {
        let durable = Arc::new(FlakyStore::with(&[
            ("package-list", r#"["foo"]"#),
            ("repo-mappings", r#"{"foo":"org/foo"}"#),
            ("package-data", r#"{"foo":{"grantedPoints":10}}"#),
        ]));
        durable.fail_reads("package-data", 1);
        let registry = ConfigRegistry::new(durable_storage(durable.clone()), Defaults::default());
        let fetcher = Arc::new(FakeRepos::with(&[("org/foo", 5)]));
        let ingestor =
            StatsIngestor::new(registry.clone(), fetcher.clone(), &UpstreamConfig::default());

        assert!(matches!(
            ingestor.run().await,
            Err(IngestError::BaselineUnavailable(_))
        ));
        assert_eq!(fetcher.calls.count(), 0);
        assert_eq!(
            durable.data.lookup("package-data").as_deref(),
            Some(r#"{"foo":{"grantedPoints":10}}"#)
        );
        assert_eq!(durable.data.lookup("github-data"), None);

        ingestor.run().await.unwrap();
        let record: Value =
            serde_json::from_str(&durable.data.lookup("package-data").unwrap()).unwrap();
        assert_eq!(record["foo"]["grantedPoints"], 10);
        assert_eq!(record["foo"]["github"]["stars"], 5);
    }
}

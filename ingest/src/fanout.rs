use crate::fetch::FetchError;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs `fetch(arg)` for every `(package, arg)` pair, at most `concurrency` at
/// a time, each bounded by `timeout`.
///
/// Every package gets a result. A fetch that times out, panics or never
/// reports back is a failure of that package only.
pub(crate) async fn fetch_all<T, F, Fut>(
    items: Vec<(String, String)>,
    concurrency: usize,
    timeout: Duration,
    fetch: F,
) -> BTreeMap<String, Result<T, FetchError>>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set = JoinSet::new();
    let mut pending = HashSet::new();

    for (package, arg) in items {
        let semaphore = semaphore.clone();
        let request = fetch(arg);

        pending.insert(package.clone());
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (package, Err(FetchError::Aborted));
            };
            let result = match tokio::time::timeout(timeout, request).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            };
            (package, result)
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((package, result)) => {
                pending.remove(&package);
                results.insert(package, result);
            }
            Err(e) => tracing::error!("Fetch task panicked: {}", e),
        }
    }

    for package in pending.drain() {
        results.insert(package, Err(FetchError::Aborted));
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn items(names: &[&str]) -> Vec<(String, String)> {
        names
            .iter()
            .map(|n| (n.to_string(), n.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let results = fetch_all(
            items(&["a", "slow", "boom", "b"]),
            2,
            Duration::from_millis(50),
            |arg| async move {
                match arg.as_str() {
                    "slow" => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(0)
                    }
                    "boom" => panic!("fetch exploded"),
                    other => Ok(other.len()),
                }
            },
        )
        .await;

        assert_eq!(results.len(), 4);
        assert!(matches!(results["a"], Ok(1)));
        assert!(matches!(results["b"], Ok(1)));
        assert!(matches!(results["slow"], Err(FetchError::Timeout(_))));
        assert!(matches!(results["boom"], Err(FetchError::Aborted)));
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = fetch_all(
            items(&["a", "b", "c", "d", "e", "f"]),
            2,
            Duration::from_secs(5),
            |_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;

        assert!(results.values().all(Result::is_ok));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}

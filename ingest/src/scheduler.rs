//! Runs the ingestors on fixed intervals inside the serving process.

use crate::config::ScheduleConfig;
use crate::metrics_defs::RUN_SKIPPED;
use crate::{IngestError, ScoreIngestor, StatsIngestor};
use shared::counter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background ingestion tasks. Dropping the scheduler stops them.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns a task per configured interval. The first run happens
    /// immediately.
    pub fn start(
        schedule: &ScheduleConfig,
        scores: Arc<ScoreIngestor>,
        stats: Arc<StatsIngestor>,
    ) -> Self {
        let mut handles = Vec::new();

        if let Some(secs) = schedule.score_interval_secs {
            handles.push(spawn_periodic(
                "scores",
                Duration::from_secs(secs),
                move || {
                    let scores = scores.clone();
                    async move { scores.run().await.map(|_| ()) }
                },
            ));
        }

        if let Some(secs) = schedule.stats_interval_secs {
            handles.push(spawn_periodic(
                "stats",
                Duration::from_secs(secs),
                move || {
                    let stats = stats.clone();
                    async move { stats.run().await.map(|_| ()) }
                },
            ));
        }

        Scheduler { handles }
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), IngestError>> + Send + 'static,
{
    tracing::info!(ingestor = name, ?period, "scheduling ingestion");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = job().await {
                tracing::warn!(ingestor = name, error = %e, "skipping scheduled run");
                counter!(RUN_SKIPPED, "ingestor" => name).increment(1);
            }
        }
    })
}

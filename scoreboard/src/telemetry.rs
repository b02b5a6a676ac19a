use crate::config::CommonConfig;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::describe_all;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs logging, error reporting and the metrics exporter. The returned
/// guard flushes Sentry on drop and must outlive the process's work.
pub fn init(common: &CommonConfig) -> Option<sentry::ClientInitGuard> {
    let sentry_guard = common
        .logging
        .as_ref()
        .and_then(|logging| logging.sentry_dsn.as_deref())
        .and_then(init_sentry);

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            sentry_guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .init();

    if let Some(metrics) = &common.metrics {
        match StatsdBuilder::from(metrics.statsd_host.clone(), metrics.statsd_port)
            .build(Some("scoreboard"))
        {
            Ok(recorder) => {
                if metrics::set_global_recorder(recorder).is_err() {
                    tracing::warn!("a metrics recorder is already installed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to create statsd exporter"),
        }
    }

    describe_all(store::metrics_defs::ALL_METRICS);
    describe_all(ingest::metrics_defs::ALL_METRICS);
    describe_all(gateway::metrics_defs::ALL_METRICS);

    sentry_guard
}

fn init_sentry(dsn: &str) -> Option<sentry::ClientInitGuard> {
    let dsn = match dsn.parse::<sentry::types::Dsn>() {
        Ok(dsn) => dsn,
        Err(e) => {
            eprintln!("ignoring invalid sentry DSN: {e}");
            return None;
        }
    };

    Some(sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        ..Default::default()
    }))
}

//! Metrics definitions for the ingestors.

use shared::metrics_defs::{MetricDef, MetricType};

pub const FETCH_SUCCESS: MetricDef = MetricDef {
    name: "ingest.fetch.success",
    metric_type: MetricType::Counter,
    description: "Upstream fetches that returned usable data. Tagged with source.",
};

pub const FETCH_FAILURE: MetricDef = MetricDef {
    name: "ingest.fetch.failure",
    metric_type: MetricType::Counter,
    description: "Upstream fetches that failed or timed out. Tagged with source.",
};

pub const RUN_DURATION: MetricDef = MetricDef {
    name: "ingest.run.duration",
    metric_type: MetricType::Histogram,
    description: "Ingestion run duration in seconds. Tagged with ingestor.",
};

pub const RUN_SKIPPED: MetricDef = MetricDef {
    name: "ingest.run.skipped",
    metric_type: MetricType::Counter,
    description: "Scheduled runs skipped because the previous run was still going or the stored data could not be read. Tagged with ingestor.",
};

pub const ALL_METRICS: &[MetricDef] = &[FETCH_SUCCESS, FETCH_FAILURE, RUN_DURATION, RUN_SKIPPED];

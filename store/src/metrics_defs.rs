//! Metrics definitions for the store.

use shared::metrics_defs::{MetricDef, MetricType};

pub const STORE_FALLBACK: MetricDef = MetricDef {
    name: "store.fallback",
    metric_type: MetricType::Counter,
    description: "Durable store calls answered by the in-process store instead. Tagged with op.",
};

pub const STORE_WRITE_FAILED: MetricDef = MetricDef {
    name: "store.write.failed",
    metric_type: MetricType::Counter,
    description: "Logical writes where at least one physical key could not be written",
};

pub const ALL_METRICS: &[MetricDef] = &[STORE_FALLBACK, STORE_WRITE_FAILED];

//! Metrics definitions for the HTTP gateway.

use shared::metrics_defs::{MetricDef, MetricType};

pub const PROBE_OUTCOME: MetricDef = MetricDef {
    name: "gateway.probe",
    metric_type: MetricType::Counter,
    description: "Package data lookups. Tagged with outcome (found, not_found) and tier.",
};

pub const MANAGE_REJECTED: MetricDef = MetricDef {
    name: "gateway.manage.rejected",
    metric_type: MetricType::Counter,
    description: "Management requests rejected before any mutation. Tagged with reason.",
};

pub const ALL_METRICS: &[MetricDef] = &[PROBE_OUTCOME, MANAGE_REJECTED];

//! HTTP surface: the package data read path and the management endpoints.

pub mod api;
pub mod config;
pub mod manage;
pub mod metrics_defs;
pub mod serving;

pub use api::{AppState, GatewayError, router, serve};
pub use serving::{PackageView, Resolution, ServingGateway};

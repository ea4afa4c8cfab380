//! # RelayCore Telemetry
//!
//! Structured logging setup, plus the metric-hook shapes the pipeline and
//! its subsystems populate. No exporter is wired up here — metrics UI is
//! out of scope — but every shape below is what a Prometheus or
//! OpenTelemetry exporter would read if one were attached downstream.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod metrics;
mod tracing_setup;

pub use metrics::{PerformanceSnapshot, PerformanceTimer};
pub use tracing_setup::{init_tracing, TelemetryConfig};

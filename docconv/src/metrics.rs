//! Conversion metrics, recorded through the `metrics` facade.
//!
//! When `enable_metrics` is set the axum-prometheus recorder is installed and these series are
//! exported at `/internal/metrics` alongside the HTTP metrics; otherwise the calls are no-ops.

use std::time::Instant;

use crate::errors::Result;

/// Count a finished conversion and observe its duration.
pub fn record_conversion<T>(tool: &'static str, started: Instant, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };

    metrics::counter!("docconv_conversions_total", "tool" => tool, "outcome" => outcome).increment(1);
    metrics::histogram!("docconv_conversion_duration_seconds", "tool" => tool).record(started.elapsed().as_secs_f64());
}

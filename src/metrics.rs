//! Prometheus metrics for blobgate
//!
//! Defines metrics for:
//! - Request counts by method and status
//! - Request latency
//! - Storage operation counts by operation and outcome
//! - Storage operation duration

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

use crate::errors::GatewayError;

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

lazy_static! {
    /// Registry for all metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// HTTP request counter by method and status
    pub static ref HTTP_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("blobgate_http_requests_total", "Total HTTP requests"),
        &["method", "status"]
    )
    .expect("Failed to create HTTP_REQUESTS metric");

    /// HTTP request latency histogram
    pub static ref HTTP_REQUEST_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "blobgate_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(LATENCY_BUCKETS.to_vec())
    )
    .expect("Failed to create HTTP_REQUEST_DURATION metric");

    /// Storage operation counter by operation and outcome (`ok` or error kind)
    pub static ref STORAGE_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("blobgate_storage_operations_total", "Total storage operations"),
        &["provider", "operation", "status"]
    )
    .expect("Failed to create STORAGE_OPERATIONS metric");

    /// Storage operation duration histogram
    pub static ref STORAGE_OPERATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "blobgate_storage_operation_duration_seconds",
            "Storage operation duration in seconds"
        )
        .buckets(LATENCY_BUCKETS.to_vec()),
        &["provider", "operation"]
    )
    .expect("Failed to create STORAGE_OPERATION_DURATION metric");
}

/// Register all metrics with the global registry
pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(HTTP_REQUESTS.clone()))?;
    REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATIONS.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATION_DURATION.clone()))?;
    Ok(())
}

/// Render the registry in the Prometheus text format
pub fn render() -> Result<String, Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Times one storage operation and records its outcome.
pub struct OperationTimer {
    provider: String,
    operation: &'static str,
    started: Instant,
}

impl OperationTimer {
    pub fn start(provider: &str, operation: &'static str) -> Self {
        Self {
            provider: provider.to_string(),
            operation,
            started: Instant::now(),
        }
    }

    pub fn observe<T>(self, result: &Result<T, GatewayError>) {
        let status = match result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        STORAGE_OPERATIONS
            .with_label_values(&[self.provider.as_str(), self.operation, status])
            .inc();
        STORAGE_OPERATION_DURATION
            .with_label_values(&[self.provider.as_str(), self.operation])
            .observe(self.started.elapsed().as_secs_f64());
    }
}

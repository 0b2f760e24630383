use crate::error::{LimiterError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Create a new metrics service. Installs the process-wide recorder, so
    /// call it once.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            LimiterError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        describe_counter!(
            "limiter_decisions_total",
            "Rate decisions by identity class and outcome"
        );
        describe_counter!(
            "limiter_store_errors_total",
            "Decision store failures by the failure policy applied"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record one rate decision
pub fn record_decision(class: &'static str, outcome: &'static str) {
    counter!("limiter_decisions_total", "class" => class, "outcome" => outcome).increment(1);
}

/// Record a store failure and the policy that handled it
pub fn record_store_error(policy: &'static str) {
    counter!("limiter_store_errors_total", "policy" => policy).increment(1);
}

//! # Application State Management
//!
//! Shared state accessed by every HTTP request handler: the runtime
//! configuration behind `Arc<RwLock<_>>`, request metrics, the server start
//! time, and the long-lived pipeline pieces (backend registry and stage
//! implementations) initialized once in `main`.

use crate::backends::BackendRegistry;
use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all HTTP request handlers.
///
/// Mutable pieces (config, metrics) sit behind `Arc<RwLock<_>>` so many
/// requests can read concurrently while updates stay exclusive. The
/// registry and pipeline are immutable after startup and only need `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Performance metrics (updated by every request)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,

    /// Startup-initialized classification backends
    pub registry: Arc<BackendRegistry>,

    /// Stage implementations the classify handler runs
    pub pipeline: Arc<Pipeline>,
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Classification pipeline runs currently in flight
    pub active_classifications: u32,

    /// Detailed metrics per endpoint, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, registry: BackendRegistry, pipeline: Pipeline) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            registry: Arc::new(registry),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately so other threads are
    /// never blocked across a response.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating the new value.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn increment_active_classifications(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_classifications += 1;
    }

    pub fn decrement_active_classifications(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_classifications > 0 {
            metrics.active_classifications -= 1;
        }
    }

    /// Snapshot of current metrics for the metrics endpoint.
    ///
    /// Clones under a read lock so serialization never holds the lock.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_classifications: metrics.active_classifications,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time in milliseconds for this endpoint.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metric_averages() {
        let metric = EndpointMetric {
            request_count: 10,
            total_duration_ms: 500,
            error_count: 2,
        };
        assert!((metric.average_duration_ms() - 50.0).abs() < 1e-9);
        assert!((metric.error_rate() - 0.2).abs() < 1e-9);

        let empty = EndpointMetric::default();
        assert_eq!(empty.average_duration_ms(), 0.0);
        assert_eq!(empty.error_rate(), 0.0);
    }
}

//! Prometheus metrics for daemon health observability.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `sessiond_sessions_active` | Gauge | Currently registered sessions |
//! | `sessiond_sweep_passes_total` | Counter | Completed liveness sweeps |
//! | `sessiond_sweep_evictions_total` | Counter | Sessions evicted by sweeps |
//!
//! The registry itself stays metrics-free; the sweeper reports after each
//! pass and the gauge tracks the table size it observed.

use std::sync::Arc;

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Failed to register a metric with Prometheus.
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    /// Failed to encode metrics output.
    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Daemon health metrics.
///
/// All metrics use interior mutability and are safe to share across
/// threads.
#[derive(Clone)]
pub struct DaemonMetrics {
    /// Number of currently registered sessions.
    sessions_active: Gauge,

    /// Total completed liveness sweep passes.
    sweep_passes_total: IntCounter,

    /// Total sessions evicted because their owner process exited.
    sweep_evictions_total: IntCounter,
}

impl DaemonMetrics {
    /// Creates daemon metrics and registers them with the given registry.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register.
    pub fn new(registry: &Registry) -> MetricsResult<Self> {
        let sessions_active = Gauge::new(
            "sessiond_sessions_active",
            "Number of currently registered sessions",
        )?;
        registry.register(Box::new(sessions_active.clone()))?;

        let sweep_passes_total = IntCounter::new(
            "sessiond_sweep_passes_total",
            "Total completed liveness sweep passes",
        )?;
        registry.register(Box::new(sweep_passes_total.clone()))?;

        let sweep_evictions_total = IntCounter::new(
            "sessiond_sweep_evictions_total",
            "Total sessions evicted because their owner process exited",
        )?;
        registry.register(Box::new(sweep_evictions_total.clone()))?;

        Ok(Self {
            sessions_active,
            sweep_passes_total,
            sweep_evictions_total,
        })
    }

    /// Records a completed sweep pass and the table size it left behind.
    #[allow(clippy::cast_precision_loss)] // session counts are far below 2^52
    pub fn sweep_completed(&self, evicted: usize, active_sessions: usize) {
        self.sweep_passes_total.inc();
        self.sweep_evictions_total.inc_by(evicted as u64);
        self.sessions_active.set(active_sessions as f64);
    }

    /// Returns the active-sessions gauge value. Primarily for tests.
    #[must_use]
    pub fn active_sessions(&self) -> f64 {
        self.sessions_active.get()
    }

    /// Returns the total evictions. Primarily for tests.
    #[must_use]
    pub fn eviction_count(&self) -> u64 {
        self.sweep_evictions_total.get()
    }

    /// Returns the total completed sweeps. Primarily for tests.
    #[must_use]
    pub fn sweep_count(&self) -> u64 {
        self.sweep_passes_total.get()
    }
}

/// Metrics registry wrapper holding the Prometheus registry and the daemon
/// metrics registered with it.
#[derive(Clone)]
pub struct MetricsRegistry {
    /// The Prometheus registry.
    registry: Registry,
    /// Daemon metrics registered with this registry.
    daemon_metrics: DaemonMetrics,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all daemon metrics registered.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails.
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();
        let daemon_metrics = DaemonMetrics::new(&registry)?;
        Ok(Self {
            registry,
            daemon_metrics,
        })
    }

    /// Returns a reference to the daemon metrics.
    #[must_use]
    pub const fn daemon_metrics(&self) -> &DaemonMetrics {
        &self.daemon_metrics
    }

    /// Encodes all metrics in Prometheus text format, as served from the
    /// `/metrics` HTTP endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}

/// Shared metrics registry for use across the daemon.
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

/// Creates a new shared metrics registry.
///
/// # Errors
///
/// Returns an error if metric registration fails.
pub fn new_shared_registry() -> MetricsResult<SharedMetricsRegistry> {
    Ok(Arc::new(MetricsRegistry::new()?))
}

//! The recurring liveness sweep.
//!
//! A fixed-period background task, independent of any request path. Each
//! tick asks the registry to evict every session whose owning service
//! process no longer exists. The timer is rearmed unconditionally after
//! each pass (a sweep that evicts records does not shift the cadence) and
//! a tick never raises outward: per-record failures are logged inside the
//! eviction pass and skipped.

use std::sync::Arc;
use std::time::Duration;

use sessiond_core::process::ProcessProbe;
use sessiond_core::SessionRegistry;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};

use crate::metrics::SharedMetricsRegistry;

/// Recurring task that evicts sessions of dead owner processes.
pub struct LivenessSweeper {
    /// The registry being swept.
    registry: Arc<SessionRegistry>,
    /// Process-existence probe.
    probe: Arc<dyn ProcessProbe>,
    /// Sweep period.
    period: Duration,
    /// Metrics sink, if enabled.
    metrics: Option<SharedMetricsRegistry>,
}

impl LivenessSweeper {
    /// Creates a sweeper over the given registry and probe.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        probe: Arc<dyn ProcessProbe>,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            probe,
            period,
            metrics: None,
        }
    }

    /// Attaches a metrics registry reported to after every pass.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SharedMetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs one sweep pass immediately. Returns the evicted count.
    pub fn sweep_once(&self) -> usize {
        let evicted = self.registry.evict_dead_owners(self.probe.as_ref());
        if let Some(metrics) = &self.metrics {
            metrics
                .daemon_metrics()
                .sweep_completed(evicted, self.registry.len());
        }
        evicted
    }

    /// Spawns the recurring sweep onto the current runtime.
    ///
    /// The task runs for the life of the process; there is no shutdown path
    /// other than process termination.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            // Rearm relative to pass completion so a slow pass delays the
            // next tick instead of bunching ticks together.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately;
            // consume it so the first sweep runs one full period after
            // startup.
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = self.sweep_once();
                if evicted > 0 {
                    info!(evicted, "liveness sweep evicted dead-owner sessions");
                } else {
                    trace!("liveness sweep found nothing to evict");
                }
            }
        })
    }
}

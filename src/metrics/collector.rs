//! Metrics collection and registry.

use crate::context::{Context, ContextError, ContextStats};
use prometheus::{IntCounter, IntGauge, Registry, TextEncoder, Encoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of context state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether the context still holds a live native handle.
    pub context_active: bool,
    /// Devices returned by the most recent query, under that query's mask.
    pub connected_devices: usize,
    /// Activity counters of the context.
    pub stats: ContextStats,
}

impl MetricsSnapshot {
    /// Creates a snapshot from a context and the size of its last query.
    pub fn from_context(context: &Context, connected_devices: usize) -> Self {
        Self {
            context_active: !context.is_disposed(),
            connected_devices,
            stats: context.stats(),
        }
    }

    /// Creates a snapshot from a fresh device query.
    ///
    /// Hot-plug events report devices regardless of the query mask, so
    /// the connected count is re-read instead of adjusted from events.
    pub fn query(context: &Context, include_platform_camera: bool) -> Result<Self, ContextError> {
        let connected_devices = context.query_devices(include_platform_camera)?.len()?;
        Ok(Self::from_context(context, connected_devices))
    }
}

/// Prometheus metrics registry for context monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    context_active: IntGauge,
    connected_devices: IntGauge,

    device_queries_total: IntCounter,
    hotplug_events_total: IntCounter,
    devices_added_total: IntCounter,
    devices_removed_total: IntCounter,
    observer_failures_total: IntCounter,
    events_rejected_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all context metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let context_active = IntGauge::new(
            "rs2_context_active",
            "Whether the context holds a live native handle (1=active, 0=disposed)",
        )?;
        let connected_devices = IntGauge::new(
            "rs2_context_connected_devices",
            "Devices returned by the most recent query",
        )?;
        let device_queries_total = IntCounter::new(
            "rs2_context_device_queries_total",
            "Total device queries issued",
        )?;
        let hotplug_events_total = IntCounter::new(
            "rs2_context_hotplug_events_total",
            "Total device change events dispatched to observers",
        )?;
        let devices_added_total = IntCounter::new(
            "rs2_context_devices_added_total",
            "Total devices reported as connected",
        )?;
        let devices_removed_total = IntCounter::new(
            "rs2_context_devices_removed_total",
            "Total devices reported as disconnected",
        )?;
        let observer_failures_total = IntCounter::new(
            "rs2_context_observer_failures_total",
            "Total observer invocations that panicked",
        )?;
        let events_rejected_total = IntCounter::new(
            "rs2_context_events_rejected_total",
            "Total device change events received after dispose",
        )?;

        registry.register(Box::new(context_active.clone()))?;
        registry.register(Box::new(connected_devices.clone()))?;
        registry.register(Box::new(device_queries_total.clone()))?;
        registry.register(Box::new(hotplug_events_total.clone()))?;
        registry.register(Box::new(devices_added_total.clone()))?;
        registry.register(Box::new(devices_removed_total.clone()))?;
        registry.register(Box::new(observer_failures_total.clone()))?;
        registry.register(Box::new(events_rejected_total.clone()))?;

        Ok(Self {
            registry,
            context_active,
            connected_devices,
            device_queries_total,
            hotplug_events_total,
            devices_added_total,
            devices_removed_total,
            observer_failures_total,
            events_rejected_total,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.context_active.set(if snapshot.context_active { 1 } else { 0 });
        self.connected_devices.set(snapshot.connected_devices as i64);

        let stats = &snapshot.stats;
        catch_up(&self.device_queries_total, stats.device_queries);
        catch_up(&self.hotplug_events_total, stats.events_dispatched);
        catch_up(&self.devices_added_total, stats.devices_added);
        catch_up(&self.devices_removed_total, stats.devices_removed);
        catch_up(&self.observer_failures_total, stats.observer_failures);
        catch_up(&self.events_rejected_total, stats.events_rejected);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Counters only move forward: increment by the difference.
fn catch_up(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

//! Prometheus metrics for context activity.
//!
//! # Metrics Exposed
//!
//! - `rs2_context_active` - 1 while the context holds a native handle
//! - `rs2_context_connected_devices` - Devices in the most recent query
//! - `rs2_context_device_queries_total` - Device queries issued
//! - `rs2_context_hotplug_events_total` - Device change events dispatched
//! - `rs2_context_devices_added_total` / `rs2_context_devices_removed_total`
//! - `rs2_context_observer_failures_total` - Observer panics
//! - `rs2_context_events_rejected_total` - Events received after dispose
//!
//! The HTTP exporter is only built with the `metrics` feature.
//!
//! # Example
//!
//! ```no_run
//! use rs2_context::metrics::{MetricsRegistry, MetricsSnapshot};
//! use rs2_context::{Context, MockBackend};
//! use std::sync::Arc;
//!
//! let ctx = Context::new(Arc::new(MockBackend::new())).unwrap();
//! let devices = ctx.devices().unwrap().len().unwrap();
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.update(&MetricsSnapshot::from_context(&ctx, devices));
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};

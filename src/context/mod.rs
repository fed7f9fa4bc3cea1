//! The runtime context and its hot-plug notification bridge.
//!
//! A [`Context`] owns one native context handle for the whole session.
//! Control flow is always the same: construct, optionally subscribe to
//! device changes, query devices any number of times, dispose once.
//!
//! ```text
//! Created → Active → Disposed
//! ```

mod error;
mod hotplug;
mod session;
mod version;

pub use error::ContextError;
pub use hotplug::{ContextStats, DevicesChangedObserver, HotplugBridge, ObserverId};
pub use session::Context;
pub use version::ApiVersion;

//! Safe Rust binding for the librealsense2 context.
//!
//! A [`Context`] owns the library's top-level runtime object. It reports
//! the library API version, takes snapshots of connected devices and
//! forwards device connect/disconnect notifications to observers.
//!
//! # Architecture
//!
//! ```text
//! Context ──► NativeBackend ──► librealsense2 (feature "librealsense")
//!    │              ▲          └► MockBackend (tests, demo)
//!    └► HotplugBridge ◄─ native notification thread
//! ```
//!
//! # Design Principles
//!
//! - **Exclusive ownership**: one native handle per context, released once
//! - **No silent native errors**: every error output becomes an `Err`
//! - **No leaked lists**: device lists are released on drop, on every path
//! - **Fail loudly after dispose**: operations return `UseAfterDispose`
//!
//! # Example
//!
//! ```no_run
//! use rs2_context::{Context, MockBackend};
//! use std::sync::Arc;
//!
//! let ctx = Context::new(Arc::new(MockBackend::new())).unwrap();
//! println!("librealsense {}", ctx.version());
//!
//! ctx.on_devices_changed(|removed, added| {
//!     println!(
//!         "{} removed, {} added",
//!         removed.len().unwrap_or(0),
//!         added.len().unwrap_or(0)
//!     );
//! })
//! .unwrap();
//!
//! for info in ctx.devices().unwrap().infos().unwrap() {
//!     println!("{}", info);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod device;
pub mod metrics;
pub mod native;

// Re-export commonly used types at crate root
pub use context::{ApiVersion, Context, ContextError, ContextStats, ObserverId};
pub use device::{CameraInfo, DeviceInfo, DeviceList, DeviceMask, ProductLine};
pub use native::{MockBackend, MockDevice, NativeBackend, NativeError};

#[cfg(feature = "librealsense")]
pub use native::Rs2Backend;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

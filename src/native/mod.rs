//! Boundary to the native runtime.
//!
//! Everything the binding needs from librealsense goes through the
//! [`NativeBackend`] trait. This keeps the lifetime logic in
//! [`Context`](crate::Context) independent of the actual library, so it can
//! be driven by [`MockBackend`] in tests and by the real C API when the
//! `librealsense` feature is enabled.

mod mock;

#[cfg(feature = "librealsense")]
mod ffi;

pub use mock::{MockBackend, MockDevice};

#[cfg(feature = "librealsense")]
pub use ffi::Rs2Backend;

use crate::context::HotplugBridge;
use crate::device::{CameraInfo, DeviceMask};
use std::sync::Arc;
use thiserror::Error;

/// Opaque handle to a native context object.
///
/// Not interpretable by calling code; only the backend that produced it
/// can use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub(crate) usize);

/// Opaque handle to a native device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListHandle(pub(crate) usize);

impl ContextHandle {
    /// Wraps a raw handle value.
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    pub fn as_raw(self) -> usize {
        self.0
    }
}

impl ListHandle {
    /// Wraps a raw handle value.
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// An error reported through a native entry point's error channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{function} failed: {message}")]
pub struct NativeError {
    /// Name of the native function that reported the error.
    pub function: String,
    /// Message reported by the native library.
    pub message: String,
}

impl NativeError {
    pub fn new(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            message: message.into(),
        }
    }
}

/// Converts a count reported by the library. Negative values are errors.
#[cfg_attr(not(feature = "librealsense"), allow(dead_code))]
pub(crate) fn count_from_native(function: &str, raw: i32) -> Result<usize, NativeError> {
    usize::try_from(raw)
        .map_err(|_| NativeError::new(function, format!("returned negative count {}", raw)))
}

/// The native library's exported functions, as seen by the binding.
///
/// Every fallible call reports through `Result`; implementations must
/// never swallow the native error output. Release functions
/// (`delete_*`) cannot fail.
pub trait NativeBackend: Send + Sync {
    /// Returns the library's encoded API version.
    fn api_version(&self) -> Result<i32, NativeError>;

    /// Creates a native context tagged with `api_version`.
    fn create_context(&self, api_version: i32) -> Result<ContextHandle, NativeError>;

    /// Destroys a native context. After this returns, no callback
    /// registered on it will be invoked.
    fn delete_context(&self, handle: ContextHandle);

    /// Registers the hot-plug trampoline for `handle`.
    ///
    /// The caller keeps `bridge` alive until after [`delete_context`]
    /// returns; the backend may hold a raw or weak reference only.
    ///
    /// [`delete_context`]: NativeBackend::delete_context
    fn set_devices_changed_callback(
        &self,
        handle: ContextHandle,
        bridge: &Arc<HotplugBridge>,
    ) -> Result<(), NativeError>;

    /// Creates a snapshot of the devices matching `mask`.
    fn query_devices(
        &self,
        handle: ContextHandle,
        mask: DeviceMask,
    ) -> Result<ListHandle, NativeError>;

    /// Number of devices in a list.
    fn device_count(&self, list: ListHandle) -> Result<usize, NativeError>;

    /// Reads one info field of the device at `index`. `Ok(None)` means
    /// the device doesn't support that field.
    fn device_info(
        &self,
        list: ListHandle,
        index: usize,
        info: CameraInfo,
    ) -> Result<Option<String>, NativeError>;

    /// Releases a device list.
    fn delete_device_list(&self, list: ListHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_display() {
        let err = NativeError::new("rs2_create_context", "no backend");
        assert_eq!(err.to_string(), "rs2_create_context failed: no backend");
    }

    #[test]
    fn test_negative_count_is_an_error() {
        assert_eq!(count_from_native("rs2_get_device_count", 3), Ok(3));
        let err = count_from_native("rs2_get_device_count", -1).unwrap_err();
        assert_eq!(err.function, "rs2_get_device_count");
        assert!(err.message.contains("-1"));
    }

    #[test]
    fn test_handle_raw_roundtrip() {
        assert_eq!(ContextHandle::from_raw(42).as_raw(), 42);
        assert_eq!(ListHandle::from_raw(7).as_raw(), 7);
    }
}

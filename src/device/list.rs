//! Owned snapshot of connected devices.

use super::{CameraInfo, DeviceInfo};
use crate::context::ContextError;
use crate::native::{ListHandle, NativeBackend};
use std::fmt;
use std::sync::Arc;

/// A snapshot of the devices connected at one point in time.
///
/// The list owns its native handle and releases it exactly once, on
/// [`release`](DeviceList::release) or on drop. Its contents don't follow
/// later connects or disconnects.
pub struct DeviceList {
    backend: Arc<dyn NativeBackend>,
    handle: Option<ListHandle>,
}

impl DeviceList {
    /// Takes ownership of a native list handle.
    pub(crate) fn from_raw(backend: Arc<dyn NativeBackend>, handle: ListHandle) -> Self {
        Self {
            backend,
            handle: Some(handle),
        }
    }

    fn handle(&self) -> Result<ListHandle, ContextError> {
        self.handle.ok_or(ContextError::UseAfterDispose)
    }

    /// Number of devices in the snapshot.
    pub fn len(&self) -> Result<usize, ContextError> {
        Ok(self.backend.device_count(self.handle()?)?)
    }

    /// Whether the snapshot holds no devices.
    pub fn is_empty(&self) -> Result<bool, ContextError> {
        Ok(self.len()? == 0)
    }

    /// Reads the info fields of the device at `index`.
    pub fn info(&self, index: usize) -> Result<DeviceInfo, ContextError> {
        let handle = self.handle()?;
        let count = self.backend.device_count(handle)?;
        if index >= count {
            return Err(ContextError::IndexOutOfRange { index, count });
        }

        let mut info = DeviceInfo::default();
        for field in CameraInfo::ALL {
            info.set(field, self.backend.device_info(handle, index, field)?);
        }
        Ok(info)
    }

    /// Reads the info of every device in the snapshot.
    pub fn infos(&self) -> Result<Vec<DeviceInfo>, ContextError> {
        (0..self.len()?).map(|i| self.info(i)).collect()
    }

    /// Returns whether a device with `serial` is in the snapshot.
    pub fn contains_serial(&self, serial: &str) -> Result<bool, ContextError> {
        let handle = self.handle()?;
        for index in 0..self.backend.device_count(handle)? {
            let found = self
                .backend
                .device_info(handle, index, CameraInfo::SerialNumber)?;
            if found.as_deref() == Some(serial) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Releases the native list now instead of at drop.
    pub fn release(mut self) {
        self.release_handle();
    }

    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.backend.delete_device_list(handle);
        }
    }
}

impl Drop for DeviceList {
    fn drop(&mut self) {
        self.release_handle();
    }
}

impl fmt::Debug for DeviceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceList")
            .field("handle", &self.handle)
            .finish()
    }
}

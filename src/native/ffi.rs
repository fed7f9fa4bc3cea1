//! Bindings to the librealsense2 C API.
//!
//! Each call passes an `rs2_error**` out-parameter. A non-null error is
//! turned into a [`NativeError`] and freed; it is never ignored.

#![allow(unsafe_code)]

use super::{count_from_native, ContextHandle, ListHandle, NativeBackend, NativeError};
use crate::context::HotplugBridge;
use crate::device::{CameraInfo, DeviceMask};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

#[repr(C)]
struct Rs2Error {
    _private: [u8; 0],
}

#[repr(C)]
struct Rs2Context {
    _private: [u8; 0],
}

#[repr(C)]
struct Rs2DeviceList {
    _private: [u8; 0],
}

#[repr(C)]
struct Rs2Device {
    _private: [u8; 0],
}

type DevicesChangedCallbackPtr =
    Option<unsafe extern "C" fn(*mut Rs2DeviceList, *mut Rs2DeviceList, *mut c_void)>;

#[link(name = "realsense2")]
extern "C" {
    fn rs2_get_api_version(error: *mut *mut Rs2Error) -> c_int;
    fn rs2_create_context(api_version: c_int, error: *mut *mut Rs2Error) -> *mut Rs2Context;
    fn rs2_delete_context(context: *mut Rs2Context);
    fn rs2_set_devices_changed_callback(
        context: *const Rs2Context,
        callback: DevicesChangedCallbackPtr,
        user: *mut c_void,
        error: *mut *mut Rs2Error,
    );
    fn rs2_query_devices_ex(
        context: *const Rs2Context,
        product_mask: c_int,
        error: *mut *mut Rs2Error,
    ) -> *mut Rs2DeviceList;
    fn rs2_delete_device_list(list: *mut Rs2DeviceList);
    fn rs2_get_device_count(list: *const Rs2DeviceList, error: *mut *mut Rs2Error) -> c_int;
    fn rs2_create_device(
        list: *const Rs2DeviceList,
        index: c_int,
        error: *mut *mut Rs2Error,
    ) -> *mut Rs2Device;
    fn rs2_delete_device(device: *mut Rs2Device);
    fn rs2_supports_device_info(
        device: *const Rs2Device,
        info: c_int,
        error: *mut *mut Rs2Error,
    ) -> c_int;
    fn rs2_get_device_info(
        device: *const Rs2Device,
        info: c_int,
        error: *mut *mut Rs2Error,
    ) -> *const c_char;
    fn rs2_get_error_message(error: *const Rs2Error) -> *const c_char;
    fn rs2_get_failed_function(error: *const Rs2Error) -> *const c_char;
    fn rs2_free_error(error: *mut Rs2Error);
}

/// Reads a C string owned by the library, if any.
///
/// # Safety
/// `s` must be null or point to a NUL-terminated string.
unsafe fn lossy_string(s: *const c_char) -> Option<String> {
    if s.is_null() {
        None
    } else {
        Some(CStr::from_ptr(s).to_string_lossy().into_owned())
    }
}

/// Runs one native call and converts its error output.
fn checked<T>(
    function: &str,
    call: impl FnOnce(*mut *mut Rs2Error) -> T,
) -> Result<T, NativeError> {
    let mut error: *mut Rs2Error = ptr::null_mut();
    let value = call(ptr::addr_of_mut!(error));
    if error.is_null() {
        return Ok(value);
    }

    // SAFETY: `error` was produced by the library and is freed once here.
    let err = unsafe {
        let failed = lossy_string(rs2_get_failed_function(error))
            .unwrap_or_else(|| function.to_string());
        let message = lossy_string(rs2_get_error_message(error)).unwrap_or_default();
        rs2_free_error(error);
        NativeError::new(failed, message)
    };
    tracing::debug!(function, error = %err, "Native call failed");
    Err(err)
}

struct DeviceGuard(*mut Rs2Device);

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        // SAFETY: created by rs2_create_device and deleted only here.
        unsafe { rs2_delete_device(self.0) }
    }
}

unsafe extern "C" fn devices_changed_trampoline(
    removed: *mut Rs2DeviceList,
    added: *mut Rs2DeviceList,
    user: *mut c_void,
) {
    if user.is_null() {
        for list in [removed, added] {
            if !list.is_null() {
                rs2_delete_device_list(list);
            }
        }
        return;
    }

    // SAFETY: `user` is `Arc::as_ptr` of the bridge the owning Context
    // keeps alive until after rs2_delete_context. Taking our own strong
    // reference keeps it alive even if an observer drops the Context.
    let raw = user as *const HotplugBridge;
    Arc::increment_strong_count(raw);
    let bridge = Arc::from_raw(raw);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        bridge.on_devices_changed(ListHandle(removed as usize), ListHandle(added as usize))
    }));
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Device change event not delivered"),
        Err(_) => tracing::error!("Panic in device change dispatch"),
    }
}

/// [`NativeBackend`] over the installed librealsense2 shared library.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rs2Backend;

impl Rs2Backend {
    pub fn new() -> Self {
        Self
    }
}

fn context_ptr(handle: ContextHandle) -> *mut Rs2Context {
    handle.0 as *mut Rs2Context
}

fn list_ptr(list: ListHandle) -> *mut Rs2DeviceList {
    list.0 as *mut Rs2DeviceList
}

impl NativeBackend for Rs2Backend {
    fn api_version(&self) -> Result<i32, NativeError> {
        // SAFETY: no pointer arguments besides the error slot.
        checked("rs2_get_api_version", |e| unsafe { rs2_get_api_version(e) })
    }

    fn create_context(&self, api_version: i32) -> Result<ContextHandle, NativeError> {
        // SAFETY: plain call; the result is owned by the caller.
        let ctx = checked("rs2_create_context", |e| unsafe {
            rs2_create_context(api_version, e)
        })?;
        if ctx.is_null() {
            return Err(NativeError::new("rs2_create_context", "returned null context"));
        }
        Ok(ContextHandle(ctx as usize))
    }

    fn delete_context(&self, handle: ContextHandle) {
        // SAFETY: the handle came from create_context and is deleted once.
        unsafe { rs2_delete_context(context_ptr(handle)) }
    }

    fn set_devices_changed_callback(
        &self,
        handle: ContextHandle,
        bridge: &Arc<HotplugBridge>,
    ) -> Result<(), NativeError> {
        let user = Arc::as_ptr(bridge) as *mut c_void;
        // SAFETY: the context is live; `user` outlives it (see trampoline).
        checked("rs2_set_devices_changed_callback", |e| unsafe {
            rs2_set_devices_changed_callback(
                context_ptr(handle),
                Some(devices_changed_trampoline),
                user,
                e,
            )
        })
    }

    fn query_devices(
        &self,
        handle: ContextHandle,
        mask: DeviceMask,
    ) -> Result<ListHandle, NativeError> {
        // SAFETY: the context is live for the duration of the call.
        let list = checked("rs2_query_devices_ex", |e| unsafe {
            rs2_query_devices_ex(context_ptr(handle), mask.bits() as c_int, e)
        })?;
        if list.is_null() {
            return Err(NativeError::new("rs2_query_devices_ex", "returned null list"));
        }
        Ok(ListHandle(list as usize))
    }

    fn device_count(&self, list: ListHandle) -> Result<usize, NativeError> {
        // SAFETY: the list is owned by a live DeviceList.
        let count = checked("rs2_get_device_count", |e| unsafe {
            rs2_get_device_count(list_ptr(list), e)
        })?;
        count_from_native("rs2_get_device_count", count)
    }

    fn device_info(
        &self,
        list: ListHandle,
        index: usize,
        info: CameraInfo,
    ) -> Result<Option<String>, NativeError> {
        let index = c_int::try_from(index)
            .map_err(|_| NativeError::new("rs2_create_device", "device index too large"))?;
        // SAFETY: the list is owned by a live DeviceList.
        let device = checked("rs2_create_device", |e| unsafe {
            rs2_create_device(list_ptr(list), index, e)
        })?;
        if device.is_null() {
            return Err(NativeError::new("rs2_create_device", "returned null device"));
        }
        let device = DeviceGuard(device);

        let field = info as c_int;
        // SAFETY: `device` is live until the guard drops.
        let supported = checked("rs2_supports_device_info", |e| unsafe {
            rs2_supports_device_info(device.0, field, e)
        })?;
        if supported == 0 {
            return Ok(None);
        }

        // SAFETY: the returned string is owned by the device and copied
        // before the guard drops.
        checked("rs2_get_device_info", |e| unsafe {
            lossy_string(rs2_get_device_info(device.0, field, e))
        })
    }

    fn delete_device_list(&self, list: ListHandle) {
        if list.0 == 0 {
            return;
        }
        // SAFETY: ownership of the list was transferred to us.
        unsafe { rs2_delete_device_list(list_ptr(list)) }
    }
}

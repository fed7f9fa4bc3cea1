//! In-process stand-in for the native runtime.
//!
//! Simulates connected devices, hot-plug events and per-call failures,
//! and tracks every handle it hands out so tests can check that contexts
//! and device lists are released exactly once.

use super::{ContextHandle, ListHandle, NativeBackend, NativeError};
use crate::context::HotplugBridge;
use crate::device::{CameraInfo, DeviceInfo, DeviceMask, ProductLine};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    pub info: DeviceInfo,
    pub product_line: ProductLine,
}

impl MockDevice {
    pub fn new(mut info: DeviceInfo, product_line: ProductLine) -> Self {
        if info.product_line.is_none() {
            info.product_line = Some(product_line.to_string());
        }
        Self { info, product_line }
    }

    fn serial(&self) -> Option<&str> {
        self.info.serial_number.as_deref()
    }
}

#[derive(Debug, Default)]
struct Failures {
    api_version: Option<NativeError>,
    create_context: Option<NativeError>,
    set_callback: Option<NativeError>,
    query_devices: Option<NativeError>,
}

#[derive(Debug)]
struct MockState {
    api_version: i32,
    devices: Vec<MockDevice>,
    next_handle: usize,
    /// Live contexts and the callback registered on each. The native side
    /// doesn't own the callback, so it is held weakly.
    contexts: HashMap<usize, Option<Weak<HotplugBridge>>>,
    lists: HashMap<usize, Vec<MockDevice>>,
    failures: Failures,
    contexts_created: usize,
    contexts_deleted: usize,
    unknown_context_deletes: usize,
    lists_released: usize,
    unknown_list_deletes: usize,
    last_query_mask: Option<DeviceMask>,
}

impl MockState {
    fn alloc_handle(&mut self) -> usize {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn alloc_list(&mut self, devices: Vec<MockDevice>) -> ListHandle {
        let handle = self.alloc_handle();
        self.lists.insert(handle, devices);
        ListHandle(handle)
    }

    fn list(&self, list: ListHandle, function: &str) -> Result<&[MockDevice], NativeError> {
        self.lists
            .get(&list.0)
            .map(Vec::as_slice)
            .ok_or_else(|| NativeError::new(function, "invalid device list handle"))
    }
}

/// Simulated native runtime.
///
/// Device changes made with [`connect`](MockBackend::connect) and
/// [`disconnect`](MockBackend::disconnect) are delivered synchronously,
/// on the calling thread, to every live context with a registered
/// callback.
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::with_api_version(Self::DEFAULT_API_VERSION)
    }
}

impl MockBackend {
    /// 2.54.1
    pub const DEFAULT_API_VERSION: i32 = 25401;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_version(api_version: i32) -> Self {
        Self {
            state: Mutex::new(MockState {
                api_version,
                devices: Vec::new(),
                next_handle: 1,
                contexts: HashMap::new(),
                lists: HashMap::new(),
                failures: Failures::default(),
                contexts_created: 0,
                contexts_deleted: 0,
                unknown_context_deletes: 0,
                lists_released: 0,
                unknown_list_deletes: 0,
                last_query_mask: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a device without notifying anyone, as if it was present
    /// before any context was created.
    pub fn add_device(&self, device: MockDevice) {
        self.state().devices.push(device);
    }

    /// Currently connected devices.
    pub fn devices(&self) -> Vec<MockDevice> {
        self.state().devices.clone()
    }

    /// Plugs in a device and notifies every registered callback.
    ///
    /// Returns the number of contexts that accepted the notification.
    pub fn connect(&self, device: MockDevice) -> usize {
        let targets = {
            let mut state = self.state();
            state.devices.push(device.clone());
            Self::prepare_events(&mut state, &[], std::slice::from_ref(&device))
        };
        tracing::debug!(device = %device.info, "Mock device connected");
        Self::deliver(targets)
    }

    /// Unplugs the device with `serial` and notifies every registered
    /// callback. Returns `false` if no such device is connected.
    pub fn disconnect(&self, serial: &str) -> bool {
        let targets = {
            let mut state = self.state();
            let Some(pos) = state.devices.iter().position(|d| d.serial() == Some(serial)) else {
                return false;
            };
            let device = state.devices.remove(pos);
            Self::prepare_events(&mut state, std::slice::from_ref(&device), &[])
        };
        tracing::debug!(serial, "Mock device disconnected");
        Self::deliver(targets);
        true
    }

    /// Allocates a (removed, added) pair of lists, the way the native side
    /// does before invoking a devices-changed callback. The receiver owns
    /// both.
    pub fn event_lists(&self, removed: &[MockDevice], added: &[MockDevice]) -> (ListHandle, ListHandle) {
        let mut state = self.state();
        let removed = state.alloc_list(removed.to_vec());
        let added = state.alloc_list(added.to_vec());
        (removed, added)
    }

    fn prepare_events(
        state: &mut MockState,
        removed: &[MockDevice],
        added: &[MockDevice],
    ) -> Vec<(Arc<HotplugBridge>, ListHandle, ListHandle)> {
        let bridges: Vec<_> = state
            .contexts
            .values()
            .filter_map(|cb| cb.as_ref().and_then(Weak::upgrade))
            .collect();

        bridges
            .into_iter()
            .map(|bridge| {
                let removed = state.alloc_list(removed.to_vec());
                let added = state.alloc_list(added.to_vec());
                (bridge, removed, added)
            })
            .collect()
    }

    fn deliver(targets: Vec<(Arc<HotplugBridge>, ListHandle, ListHandle)>) -> usize {
        targets
            .into_iter()
            .filter(|(bridge, removed, added)| match bridge.on_devices_changed(*removed, *added) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "Mock notification rejected");
                    false
                }
            })
            .count()
    }

    pub fn set_api_version(&self, api_version: i32) {
        self.state().api_version = api_version;
    }

    pub fn fail_api_version(&self, error: NativeError) {
        self.state().failures.api_version = Some(error);
    }

    pub fn fail_create_context(&self, error: NativeError) {
        self.state().failures.create_context = Some(error);
    }

    pub fn fail_set_callback(&self, error: NativeError) {
        self.state().failures.set_callback = Some(error);
    }

    pub fn fail_query_devices(&self, error: NativeError) {
        self.state().failures.query_devices = Some(error);
    }

    pub fn clear_failures(&self) {
        self.state().failures = Failures::default();
    }

    pub fn live_contexts(&self) -> usize {
        self.state().contexts.len()
    }

    pub fn contexts_created(&self) -> usize {
        self.state().contexts_created
    }

    pub fn contexts_deleted(&self) -> usize {
        self.state().contexts_deleted
    }

    /// Deletes of handles that were never created or already deleted.
    pub fn unknown_context_deletes(&self) -> usize {
        self.state().unknown_context_deletes
    }

    pub fn live_lists(&self) -> usize {
        self.state().lists.len()
    }

    pub fn lists_released(&self) -> usize {
        self.state().lists_released
    }

    pub fn unknown_list_deletes(&self) -> usize {
        self.state().unknown_list_deletes
    }

    pub fn last_query_mask(&self) -> Option<DeviceMask> {
        self.state().last_query_mask
    }
}

impl NativeBackend for MockBackend {
    fn api_version(&self) -> Result<i32, NativeError> {
        let state = self.state();
        match &state.failures.api_version {
            Some(e) => Err(e.clone()),
            None => Ok(state.api_version),
        }
    }

    fn create_context(&self, api_version: i32) -> Result<ContextHandle, NativeError> {
        let mut state = self.state();
        if let Some(e) = &state.failures.create_context {
            return Err(e.clone());
        }
        if api_version != state.api_version {
            return Err(NativeError::new(
                "rs2_create_context",
                format!(
                    "API version mismatch: library {}, caller {}",
                    state.api_version, api_version
                ),
            ));
        }

        let handle = state.alloc_handle();
        state.contexts.insert(handle, None);
        state.contexts_created += 1;
        Ok(ContextHandle(handle))
    }

    fn delete_context(&self, handle: ContextHandle) {
        let mut state = self.state();
        if state.contexts.remove(&handle.0).is_some() {
            state.contexts_deleted += 1;
        } else {
            state.unknown_context_deletes += 1;
            tracing::warn!(handle = handle.0, "Delete of unknown mock context");
        }
    }

    fn set_devices_changed_callback(
        &self,
        handle: ContextHandle,
        bridge: &Arc<HotplugBridge>,
    ) -> Result<(), NativeError> {
        let mut state = self.state();
        if let Some(e) = &state.failures.set_callback {
            return Err(e.clone());
        }
        let slot = state.contexts.get_mut(&handle.0).ok_or_else(|| {
            NativeError::new("rs2_set_devices_changed_callback", "invalid context handle")
        })?;
        *slot = Some(Arc::downgrade(bridge));
        Ok(())
    }

    fn query_devices(
        &self,
        handle: ContextHandle,
        mask: DeviceMask,
    ) -> Result<ListHandle, NativeError> {
        let mut state = self.state();
        state.last_query_mask = Some(mask);
        if let Some(e) = &state.failures.query_devices {
            return Err(e.clone());
        }
        if !state.contexts.contains_key(&handle.0) {
            return Err(NativeError::new("rs2_query_devices_ex", "invalid context handle"));
        }

        let snapshot: Vec<_> = state
            .devices
            .iter()
            .filter(|d| mask.includes(d.product_line))
            .cloned()
            .collect();
        Ok(state.alloc_list(snapshot))
    }

    fn device_count(&self, list: ListHandle) -> Result<usize, NativeError> {
        Ok(self.state().list(list, "rs2_get_device_count")?.len())
    }

    fn device_info(
        &self,
        list: ListHandle,
        index: usize,
        info: CameraInfo,
    ) -> Result<Option<String>, NativeError> {
        let state = self.state();
        let device = state
            .list(list, "rs2_create_device")?
            .get(index)
            .ok_or_else(|| NativeError::new("rs2_create_device", "device index out of range"))?;
        Ok(device.info.get(info).map(str::to_owned))
    }

    fn delete_device_list(&self, list: ListHandle) {
        let mut state = self.state();
        if state.lists.remove(&list.0).is_some() {
            state.lists_released += 1;
        } else {
            state.unknown_list_deletes += 1;
            tracing::warn!(handle = list.0, "Delete of unknown mock device list");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(serial: &str, line: ProductLine) -> MockDevice {
        MockDevice::new(DeviceInfo::new("device", serial), line)
    }

    #[test]
    fn test_mask_filters_snapshot() {
        let mock = MockBackend::new();
        mock.add_device(device("a", ProductLine::D400));
        mock.add_device(device("b", ProductLine::Platform));
        mock.add_device(device("c", ProductLine::T200));
        let ctx = mock.create_context(MockBackend::DEFAULT_API_VERSION).unwrap();

        let intel = mock.query_devices(ctx, DeviceMask::ANY_INTEL).unwrap();
        let platform = mock.query_devices(ctx, DeviceMask::NON_INTEL).unwrap();
        let depth = mock.query_devices(ctx, DeviceMask::DEPTH).unwrap();

        assert_eq!(mock.device_count(intel).unwrap(), 2);
        assert_eq!(mock.device_count(platform).unwrap(), 1);
        assert_eq!(mock.device_count(depth).unwrap(), 1);
        assert_eq!(
            mock.device_info(platform, 0, CameraInfo::SerialNumber).unwrap(),
            Some("b".to_string())
        );
    }

    #[test]
    fn test_product_line_info_filled() {
        let dev = device("a", ProductLine::D400);
        assert_eq!(dev.info.product_line.as_deref(), Some("D400"));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mock = MockBackend::with_api_version(25401);
        assert!(mock.create_context(20700).is_err());
        assert_eq!(mock.contexts_created(), 0);
    }

    #[test]
    fn test_unknown_deletes_counted() {
        let mock = MockBackend::new();
        mock.delete_context(ContextHandle(99));
        mock.delete_device_list(ListHandle(99));
        assert_eq!(mock.unknown_context_deletes(), 1);
        assert_eq!(mock.unknown_list_deletes(), 1);
    }

    #[test]
    fn test_invalid_list_handle_errors() {
        let mock = MockBackend::new();
        let err = mock.device_count(ListHandle(5)).unwrap_err();
        assert_eq!(err.function, "rs2_get_device_count");
    }

    #[test]
    fn test_disconnect_unknown_serial() {
        let mock = MockBackend::new();
        assert!(!mock.disconnect("missing"));
    }

    #[test]
    fn test_deleted_context_not_notified() {
        let mock = Arc::new(MockBackend::new());
        let handle = mock.create_context(MockBackend::DEFAULT_API_VERSION).unwrap();
        let bridge = Arc::new(HotplugBridge::new(mock.clone()));
        mock.set_devices_changed_callback(handle, &bridge).unwrap();

        assert_eq!(mock.connect(device("a", ProductLine::D400)), 1);
        mock.delete_context(handle);
        assert_eq!(mock.connect(device("b", ProductLine::D400)), 0);
        assert_eq!(mock.live_lists(), 0);
    }

    #[test]
    fn test_dropped_callback_not_invoked() {
        let mock = Arc::new(MockBackend::new());
        let handle = mock.create_context(MockBackend::DEFAULT_API_VERSION).unwrap();
        {
            let bridge = Arc::new(HotplugBridge::new(mock.clone()));
            mock.set_devices_changed_callback(handle, &bridge).unwrap();
        }

        assert_eq!(mock.connect(device("a", ProductLine::D400)), 0);
        assert_eq!(mock.live_lists(), 0);
    }
}

//! The top-level runtime context.

use super::{
    ApiVersion, ContextError, ContextStats, DevicesChangedObserver, HotplugBridge, ObserverId,
};
use crate::device::{DeviceList, DeviceMask};
use crate::native::{ContextHandle, NativeBackend};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Owns one native context: device enumeration plus hot-plug notification.
///
/// The native context is created in [`Context::new`] and destroyed exactly
/// once, by [`Context::dispose`] or, failing that, when the value is
/// dropped. After disposal every operation fails with
/// [`ContextError::UseAfterDispose`].
///
/// # Threading
///
/// Hot-plug observers run on the native library's notification thread,
/// concurrently with whatever the owner is doing. `dispose` waits for
/// in-flight notifications before releasing the native context.
pub struct Context {
    backend: Arc<dyn NativeBackend>,
    /// `None` once released.
    handle: Option<ContextHandle>,
    api_version: ApiVersion,
    /// Kept alive for as long as the native side may call into it.
    bridge: Arc<HotplugBridge>,
    disposed: bool,
    device_queries: AtomicU64,
}

impl Context {
    /// Creates a native context and registers the hot-plug callback.
    ///
    /// Errors from the version query, context creation or callback
    /// registration are returned as [`ContextError::NativeCall`]. If the
    /// callback can't be registered the new native context is deleted
    /// before returning.
    pub fn new(backend: Arc<dyn NativeBackend>) -> Result<Self, ContextError> {
        let api_version = ApiVersion::from_encoded(backend.api_version()?);
        let handle = backend.create_context(api_version.encoded())?;

        let bridge = Arc::new(HotplugBridge::new(Arc::clone(&backend)));
        if let Err(e) = backend.set_devices_changed_callback(handle, &bridge) {
            tracing::warn!(error = %e, "Failed to register devices-changed callback");
            backend.delete_context(handle);
            return Err(e.into());
        }

        tracing::info!(api_version = %api_version, "Context created");

        Ok(Self {
            backend,
            handle: Some(handle),
            api_version,
            bridge,
            disposed: false,
            device_queries: AtomicU64::new(0),
        })
    }

    /// Creates a context backed by the installed librealsense library.
    #[cfg(feature = "librealsense")]
    pub fn native() -> Result<Self, ContextError> {
        Self::new(Arc::new(crate::native::Rs2Backend::new()))
    }

    /// The encoded API version read at construction.
    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    /// The API version as `major.minor.patch`.
    pub fn version(&self) -> String {
        self.api_version.to_string()
    }

    fn active_handle(&self) -> Result<ContextHandle, ContextError> {
        match self.handle {
            Some(handle) if !self.disposed => Ok(handle),
            _ => Err(ContextError::UseAfterDispose),
        }
    }

    /// Snapshot of the devices connected right now.
    ///
    /// Platform (non-RealSense) cameras are only listed when
    /// `include_platform_camera` is set.
    pub fn query_devices(&self, include_platform_camera: bool) -> Result<DeviceList, ContextError> {
        self.query_devices_with_mask(DeviceMask::for_platform_camera(include_platform_camera))
    }

    /// Snapshot of the connected devices whose product line matches `mask`.
    pub fn query_devices_with_mask(&self, mask: DeviceMask) -> Result<DeviceList, ContextError> {
        let handle = self.active_handle()?;
        let list = self.backend.query_devices(handle, mask)?;
        self.device_queries.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(mask = %mask, "Queried devices");
        Ok(DeviceList::from_raw(Arc::clone(&self.backend), list))
    }

    /// Same as `query_devices(false)`.
    pub fn devices(&self) -> Result<DeviceList, ContextError> {
        self.query_devices(false)
    }

    /// Registers an observer for device connect/disconnect events.
    ///
    /// The observer receives `(removed, added)` on the native notification
    /// thread. Both lists are released once all observers return.
    pub fn on_devices_changed<F>(&self, observer: F) -> Result<ObserverId, ContextError>
    where
        F: Fn(&DeviceList, &DeviceList) + Send + Sync + 'static,
    {
        self.active_handle()?;
        let observer: DevicesChangedObserver = Arc::new(observer);
        let id = self.bridge.subscribe(observer);
        tracing::debug!(observer = %id, "Observer registered");
        Ok(id)
    }

    /// Unregisters an observer. Returns whether it was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.bridge.unsubscribe(id)
    }

    pub fn clear_observers(&self) {
        self.bridge.clear();
    }

    pub fn observer_count(&self) -> usize {
        self.bridge.observer_count()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            device_queries: self.device_queries.load(Ordering::Relaxed),
            ..self.bridge.stats()
        }
    }

    /// Releases the native context. Calling it again does nothing.
    pub fn dispose(&mut self) {
        self.teardown(true);
    }

    fn teardown(&mut self, explicit: bool) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.bridge.deactivate();
        if explicit {
            self.bridge.clear();
        }

        if let Some(handle) = self.handle.take() {
            self.backend.delete_context(handle);
            tracing::info!(explicit, "Context released");
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.teardown(false);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("api_version", &self.api_version)
            .field("handle", &self.handle)
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceInfo, ProductLine};
    use crate::native::{MockBackend, MockDevice, NativeError};

    fn mock() -> Arc<MockBackend> {
        Arc::new(MockBackend::with_api_version(20700))
    }

    #[test]
    fn test_construction_reads_version() {
        let ctx = Context::new(mock()).unwrap();
        assert_eq!(ctx.api_version().encoded(), 20700);
        assert_eq!(ctx.version(), "2.7.0");
        assert!(!ctx.is_disposed());
    }

    #[test]
    fn test_short_version_string() {
        let ctx = Context::new(Arc::new(MockBackend::with_api_version(90))).unwrap();
        assert_eq!(ctx.version(), "90");
    }

    #[test]
    fn test_double_dispose_is_noop() {
        let mock = mock();
        let mut ctx = Context::new(mock.clone()).unwrap();

        ctx.dispose();
        assert!(ctx.is_disposed());
        assert!(ctx.handle.is_none());
        ctx.dispose();
        assert!(ctx.handle.is_none());

        drop(ctx);
        assert_eq!(mock.contexts_deleted(), 1);
        assert_eq!(mock.unknown_context_deletes(), 0);
    }

    #[test]
    fn test_drop_releases_context() {
        let mock = mock();
        let ctx = Context::new(mock.clone()).unwrap();
        assert_eq!(mock.live_contexts(), 1);
        drop(ctx);
        assert_eq!(mock.live_contexts(), 0);
        assert_eq!(mock.contexts_deleted(), 1);
    }

    #[test]
    fn test_query_after_dispose_fails() {
        let mut ctx = Context::new(mock()).unwrap();
        ctx.dispose();

        assert_eq!(
            ctx.query_devices(false).unwrap_err(),
            ContextError::UseAfterDispose
        );
        assert_eq!(ctx.devices().unwrap_err(), ContextError::UseAfterDispose);
        assert!(matches!(
            ctx.on_devices_changed(|_, _| {}),
            Err(ContextError::UseAfterDispose)
        ));
    }

    #[test]
    fn test_platform_flag_masks() {
        let mock = mock();
        mock.add_device(MockDevice::new(
            DeviceInfo::new("Intel RealSense D435", "001"),
            ProductLine::D400,
        ));
        mock.add_device(MockDevice::new(
            DeviceInfo::new("Integrated Webcam", "uvc-0"),
            ProductLine::Platform,
        ));
        let ctx = Context::new(mock.clone()).unwrap();

        let without = ctx.query_devices(false).unwrap();
        assert_eq!(mock.last_query_mask(), Some(DeviceMask::ANY_INTEL));
        let with = ctx.query_devices(true).unwrap();
        assert_eq!(mock.last_query_mask(), Some(DeviceMask::ANY));

        assert_eq!(without.len().unwrap(), 1);
        assert_eq!(with.len().unwrap(), 2);
        assert_eq!(ctx.stats().device_queries, 2);
    }

    #[test]
    fn test_snapshot_is_not_retroactive() {
        let mock = mock();
        mock.add_device(MockDevice::new(
            DeviceInfo::new("Intel RealSense D435", "001"),
            ProductLine::D400,
        ));
        let ctx = Context::new(mock.clone()).unwrap();

        let snapshot = ctx.devices().unwrap();
        mock.connect(MockDevice::new(
            DeviceInfo::new("Intel RealSense D455", "002"),
            ProductLine::D400,
        ));
        mock.disconnect("001");

        assert_eq!(snapshot.len().unwrap(), 1);
        assert!(snapshot.contains_serial("001").unwrap());
        assert_eq!(ctx.devices().unwrap().len().unwrap(), 1);
    }

    #[test]
    fn test_version_failure_propagates() {
        let mock = mock();
        mock.fail_api_version(NativeError::new("rs2_get_api_version", "library missing"));

        let err = Context::new(mock.clone()).unwrap_err();
        assert!(matches!(err, ContextError::NativeCall(ref e) if e.function == "rs2_get_api_version"));
        assert_eq!(mock.contexts_created(), 0);
    }

    #[test]
    fn test_failed_creation_releases_nothing() {
        let mock = mock();
        mock.fail_create_context(NativeError::new("rs2_create_context", "no usb backend"));

        assert!(matches!(
            Context::new(mock.clone()),
            Err(ContextError::NativeCall(_))
        ));
        assert_eq!(mock.contexts_deleted(), 0);
        assert_eq!(mock.unknown_context_deletes(), 0);
    }

    #[test]
    fn test_failed_callback_registration_deletes_context() {
        let mock = mock();
        mock.fail_set_callback(NativeError::new(
            "rs2_set_devices_changed_callback",
            "invalid context",
        ));

        assert!(Context::new(mock.clone()).is_err());
        assert_eq!(mock.contexts_created(), 1);
        assert_eq!(mock.contexts_deleted(), 1);
        assert_eq!(mock.live_contexts(), 0);
    }

    #[test]
    fn test_query_failure_propagates() {
        let mock = mock();
        let ctx = Context::new(mock.clone()).unwrap();
        mock.fail_query_devices(NativeError::new("rs2_query_devices_ex", "device busy"));

        assert!(matches!(ctx.devices(), Err(ContextError::NativeCall(_))));
        assert_eq!(mock.live_lists(), 0);
        assert_eq!(ctx.stats().device_queries, 0);
    }

    #[test]
    fn test_explicit_dispose_clears_observers() {
        let mock = mock();
        let mut ctx = Context::new(mock.clone()).unwrap();
        ctx.on_devices_changed(|_, _| {}).unwrap();
        assert_eq!(ctx.observer_count(), 1);

        ctx.dispose();
        assert_eq!(ctx.observer_count(), 0);
    }

    #[test]
    fn test_no_events_after_dispose() {
        let mock = mock();
        let mut ctx = Context::new(mock.clone()).unwrap();
        ctx.dispose();

        assert_eq!(
            mock.connect(MockDevice::new(
                DeviceInfo::new("Intel RealSense D435", "001"),
                ProductLine::D400,
            )),
            0
        );
        assert_eq!(mock.live_lists(), 0);
    }
}

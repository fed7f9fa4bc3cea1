//! Bridge from native device-change callbacks to registered observers.
//!
//! The native library invokes the bridge from its own thread with two
//! list handles it has handed over to us: devices removed and devices
//! added. Both are wrapped into [`DeviceList`]s before anything else so
//! they are released on every path, including observer panics and events
//! that arrive after dispose.

use super::ContextError;
use crate::device::DeviceList;
use crate::native::{ListHandle, NativeBackend};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

thread_local! {
    /// Bridges currently dispatching on this thread.
    static DISPATCHING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks `bridge` as dispatching on the current thread until dropped.
struct DispatchScope(usize);

impl DispatchScope {
    fn enter(bridge: &HotplugBridge) -> Self {
        let key = bridge as *const HotplugBridge as usize;
        DISPATCHING.with(|d| d.borrow_mut().push(key));
        Self(key)
    }

    fn is_dispatching(bridge: &HotplugBridge) -> bool {
        let key = bridge as *const HotplugBridge as usize;
        DISPATCHING.with(|d| d.borrow().contains(&key))
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.with(|d| {
            let mut d = d.borrow_mut();
            if let Some(pos) = d.iter().rposition(|k| *k == self.0) {
                d.remove(pos);
            }
        });
    }
}

/// Observer callback: `(removed, added)`.
///
/// Runs on the native notification thread. It must not block on whoever
/// owns the [`Context`](super::Context), since disposal from another thread
/// waits for in-flight notifications. Disposing or dropping the context
/// from inside an observer is allowed; observers after it are skipped.
pub type DevicesChangedObserver = Arc<dyn Fn(&DeviceList, &DeviceList) + Send + Sync>;

/// Identifies a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Counters describing a context's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Hot-plug events delivered to observers.
    pub events_dispatched: u64,
    /// Devices reported as added across all events.
    pub devices_added: u64,
    /// Devices reported as removed across all events.
    pub devices_removed: u64,
    /// Observer invocations that panicked.
    pub observer_failures: u64,
    /// Events that arrived after dispose.
    pub events_rejected: u64,
    /// Device queries issued through the context.
    pub device_queries: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events_dispatched: AtomicU64,
    devices_added: AtomicU64,
    devices_removed: AtomicU64,
    observer_failures: AtomicU64,
    events_rejected: AtomicU64,
}

/// Target of the native hot-plug trampoline.
///
/// Owned by the [`Context`](super::Context) through an `Arc` that outlives
/// the native context, so the pointer the native side holds stays valid.
pub struct HotplugBridge {
    backend: Arc<dyn NativeBackend>,
    active: AtomicBool,
    /// Held shared by every dispatch; taken exclusively to wait them out.
    in_flight: RwLock<()>,
    observers: Mutex<Vec<(ObserverId, DevicesChangedObserver)>>,
    next_observer: AtomicU64,
    counters: Counters,
}

impl HotplugBridge {
    pub(crate) fn new(backend: Arc<dyn NativeBackend>) -> Self {
        Self {
            backend,
            active: AtomicBool::new(true),
            in_flight: RwLock::new(()),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    /// Entry point for native device-change notifications.
    ///
    /// Takes ownership of both list handles. Every currently registered
    /// observer is invoked once; a panicking observer is logged and the
    /// rest still run. Fails with [`ContextError::UseAfterDispose`] once
    /// the owning context is disposed.
    pub fn on_devices_changed(
        &self,
        removed: ListHandle,
        added: ListHandle,
    ) -> Result<(), ContextError> {
        // Declared first so both lists are released before the gate opens.
        let _gate = self.in_flight.read().unwrap_or_else(PoisonError::into_inner);
        let removed = DeviceList::from_raw(Arc::clone(&self.backend), removed);
        let added = DeviceList::from_raw(Arc::clone(&self.backend), added);

        if !self.active.load(Ordering::SeqCst) {
            self.counters.events_rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Device change event received after dispose; dropping");
            return Err(ContextError::UseAfterDispose);
        }

        let removed_count = count_or_zero(&removed);
        let added_count = count_or_zero(&added);
        self.counters
            .devices_removed
            .fetch_add(removed_count as u64, Ordering::Relaxed);
        self.counters
            .devices_added
            .fetch_add(added_count as u64, Ordering::Relaxed);
        self.counters.events_dispatched.fetch_add(1, Ordering::Relaxed);

        // Snapshot so observers can (un)subscribe without deadlocking.
        let observers: Vec<_> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        tracing::debug!(
            removed = removed_count,
            added = added_count,
            observers = observers.len(),
            "Devices changed"
        );

        let _scope = DispatchScope::enter(self);
        for (id, observer) in observers {
            if !self.active.load(Ordering::SeqCst) {
                tracing::debug!("Context disposed during dispatch; skipping remaining observers");
                break;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer(&removed, &added)));
            if let Err(payload) = outcome {
                self.counters.observer_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    observer = %id,
                    panic = panic_message(&*payload),
                    "Device change observer panicked"
                );
            }
        }

        Ok(())
    }

    pub(crate) fn subscribe(&self, observer: DevicesChangedObserver) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn clear(&self) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stops dispatch. Blocks until in-flight notifications have returned,
    /// unless called from inside one, where waiting would never finish.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        if DispatchScope::is_dispatching(self) {
            tracing::debug!("Context disposed from its own observer");
            return;
        }
        drop(self.in_flight.write().unwrap_or_else(PoisonError::into_inner));
    }

    pub(crate) fn stats(&self) -> ContextStats {
        ContextStats {
            events_dispatched: self.counters.events_dispatched.load(Ordering::Relaxed),
            devices_added: self.counters.devices_added.load(Ordering::Relaxed),
            devices_removed: self.counters.devices_removed.load(Ordering::Relaxed),
            observer_failures: self.counters.observer_failures.load(Ordering::Relaxed),
            events_rejected: self.counters.events_rejected.load(Ordering::Relaxed),
            device_queries: 0,
        }
    }
}

impl fmt::Debug for HotplugBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotplugBridge")
            .field("observers", &self.observer_count())
            .field("counters", &self.counters)
            .finish()
    }
}

fn count_or_zero(list: &DeviceList) -> usize {
    list.len().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to count devices in change event");
        0
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceInfo, ProductLine};
    use crate::native::{MockBackend, MockDevice};
    use crate::Context;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn d435(serial: &str) -> MockDevice {
        MockDevice::new(DeviceInfo::new("Intel RealSense D435", serial), ProductLine::D400)
    }

    #[test]
    fn test_event_without_observers_releases_lists() {
        let mock = Arc::new(MockBackend::new());
        let ctx = Context::new(mock.clone()).unwrap();

        assert_eq!(mock.connect(d435("001")), 1);
        assert_eq!(mock.live_lists(), 0);
        assert_eq!(mock.lists_released(), 2);
        assert_eq!(ctx.stats().events_dispatched, 1);
    }

    #[test]
    fn test_each_observer_invoked_once() {
        let mock = Arc::new(MockBackend::new());
        let ctx = Context::new(mock.clone()).unwrap();

        let calls: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        for counter in &calls {
            let counter = Arc::clone(counter);
            ctx.on_devices_changed(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        mock.connect(d435("001"));
        for counter in &calls {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_removed_observer_not_invoked() {
        let mock = Arc::new(MockBackend::new());
        let ctx = Context::new(mock.clone()).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = ctx
            .on_devices_changed(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(ctx.remove_observer(id));
        assert!(!ctx.remove_observer(id));
        mock.connect(d435("001"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_observer_sees_added_and_removed() {
        let mock = Arc::new(MockBackend::new());
        let ctx = Context::new(mock.clone()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ctx.on_devices_changed(move |removed, added| {
            sink.lock()
                .unwrap()
                .push((removed.len().unwrap(), added.len().unwrap()));
        })
        .unwrap();

        mock.connect(d435("001"));
        assert!(mock.disconnect("001"));
        assert_eq!(*seen.lock().unwrap(), vec![(0, 1), (1, 0)]);

        let stats = ctx.stats();
        assert_eq!(stats.devices_added, 1);
        assert_eq!(stats.devices_removed, 1);
    }

    #[test]
    fn test_panicking_observer_does_not_leak_or_block_others() {
        let mock = Arc::new(MockBackend::new());
        let ctx = Context::new(mock.clone()).unwrap();

        ctx.on_devices_changed(|_, _| panic!("observer failure")).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        ctx.on_devices_changed(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        mock.connect(d435("001"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(mock.live_lists(), 0);
        assert_eq!(ctx.stats().observer_failures, 1);
    }

    #[test]
    fn test_observer_may_subscribe_during_dispatch() {
        let mock = Arc::new(MockBackend::new());
        let ctx = Arc::new(Context::new(mock.clone()).unwrap());

        let weak = Arc::downgrade(&ctx);
        ctx.on_devices_changed(move |_, _| {
            if let Some(ctx) = weak.upgrade() {
                ctx.on_devices_changed(|_, _| {}).unwrap();
            }
        })
        .unwrap();

        mock.connect(d435("001"));
        assert_eq!(ctx.observer_count(), 2);
    }

    #[test]
    fn test_events_from_native_thread() {
        let mock = Arc::new(MockBackend::new());
        let ctx = Context::new(mock.clone()).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        ctx.on_devices_changed(move |_, added| {
            assert!(added.contains_serial("001").unwrap());
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let native = Arc::clone(&mock);
        std::thread::spawn(move || native.connect(d435("001")))
            .join()
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(mock.live_lists(), 0);
    }

    #[test]
    fn test_bridge_rejects_after_deactivate() {
        let mock: Arc<MockBackend> = Arc::new(MockBackend::new());
        let bridge = HotplugBridge::new(mock.clone());
        let (removed, added) = mock.event_lists(&[], &[]);

        bridge.deactivate();
        assert_eq!(
            bridge.on_devices_changed(removed, added),
            Err(ContextError::UseAfterDispose)
        );
        assert_eq!(mock.live_lists(), 0);
        assert_eq!(bridge.stats().events_rejected, 1);
    }

    #[test]
    fn test_context_dropped_inside_observer() {
        let mock = Arc::new(MockBackend::new());
        let slot = Arc::new(Mutex::new(Some(Context::new(mock.clone()).unwrap())));

        let later = Arc::new(AtomicUsize::new(0));
        {
            let guard = slot.lock().unwrap();
            let ctx = guard.as_ref().unwrap();
            let owner = Arc::clone(&slot);
            ctx.on_devices_changed(move |_, _| {
                let ctx = owner.lock().unwrap().take();
                drop(ctx);
            })
            .unwrap();
            let counter = Arc::clone(&later);
            ctx.on_devices_changed(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let (done_tx, done_rx) = mpsc::channel();
        let native = Arc::clone(&mock);
        thread::spawn(move || {
            native.connect(d435("001"));
            let _ = done_tx.send(());
        });

        assert!(
            done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "dispatch did not finish after the context was dropped"
        );
        assert!(slot.lock().unwrap().is_none());
        assert_eq!(mock.contexts_deleted(), 1);
        assert_eq!(mock.live_lists(), 0);
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispose_waits_for_running_observer() {
        let mock = Arc::new(MockBackend::new());
        let mut ctx = Context::new(mock.clone()).unwrap();

        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            ctx.on_devices_changed(move |_, _| {
                started.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(200));
                finished.store(true, Ordering::SeqCst);
            })
            .unwrap();
        }

        let native = Arc::clone(&mock);
        let notifier = thread::spawn(move || native.connect(d435("001")));

        while !started.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        ctx.dispose();

        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(mock.live_lists(), 0);
        assert_eq!(notifier.join().unwrap(), 1);
    }
}

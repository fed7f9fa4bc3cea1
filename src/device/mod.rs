//! Device snapshots and the types describing devices.
//!
//! A [`DeviceList`] is what enumeration and hot-plug events hand out. It
//! owns a native list and reads device fields lazily through the backend.

mod info;
mod list;
mod mask;

pub use info::{CameraInfo, DeviceInfo};
pub use list::DeviceList;
pub use mask::{DeviceMask, ProductLine};

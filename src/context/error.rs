use crate::native::NativeError;
use thiserror::Error;

/// Errors returned by [`Context`](super::Context) and
/// [`DeviceList`](crate::DeviceList) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("native call failed: {0}")]
    NativeCall(#[from] NativeError),
    #[error("context used after dispose")]
    UseAfterDispose,
    #[error("device index {index} out of range ({count} devices)")]
    IndexOutOfRange { index: usize, count: usize },
}

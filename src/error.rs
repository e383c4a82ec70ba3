//! Error Types
//!
//! Failure taxonomy for the caching core:
//!
//! - **Device-boundary failures** (driver rejected an object creation) are
//!   recoverable at the cache level and surface as [`RhiError`]. They
//!   typically abort the caller's current frame but must not crash the
//!   process.
//! - **Algorithmic invariant violations** (zero combined hash, out-of-bounds
//!   shader-table writes, malformed slot lists) are programmer errors and are
//!   enforced with assertions, never returned as `Err`.

use thiserror::Error;

/// The error type for all fallible operations in the caching core.
#[derive(Error, Debug)]
pub enum RhiError {
    /// The device rejected creation of a driver-validated object.
    ///
    /// Carried by every cache: the entry is marked invalid and the error is
    /// handed to each caller that raced on the same key. Creation is not
    /// retried automatically.
    #[error("device failed to create {kind} (key {key:#018x}): {reason}")]
    DeviceObjectCreationFailed {
        /// What was being created ("pipeline state", "binding layout", …).
        kind: &'static str,
        /// Combined hash or structural hash identifying the failing key.
        key: u64,
        /// Driver-provided failure description.
        reason: String,
    },

    /// The device ran out of memory while creating an object.
    #[error("device out of memory while creating {kind}")]
    DeviceOutOfMemory {
        /// What was being created.
        kind: &'static str,
    },

    /// The descriptor-heap pool could neither recycle nor create a heap of
    /// the requested capacity. Callers fall back to a non-pooled allocation.
    #[error("descriptor heap pool exhausted ({kind:?}, {capacity} descriptors)")]
    DescriptorPoolExhausted {
        /// Requested heap kind.
        kind: crate::device::DescriptorHeapKind,
        /// Requested capacity.
        capacity: u32,
    },

    /// A pipeline export name was not found in the assembled state object.
    #[error("shader identifier for export `{export}` not found in pipeline")]
    UnknownShaderExport {
        /// The renamed export that failed to resolve.
        export: String,
    },
}

/// Alias for `Result<T, RhiError>`.
pub type Result<T> = std::result::Result<T, RhiError>;

//! Device Boundary
//!
//! Everything the caching core needs from the driver lives behind the
//! [`Device`] trait: object creation, descriptor copies and shader-identifier
//! queries. The trait is intentionally narrow — adapter enumeration, command
//! recording and presentation are other subsystems' business.
//!
//! Ownership model: every native object created through the boundary is
//! returned as a [`DeviceObject`], a move-only handle. The cache that
//! requested the object keeps the sole owning handle; every other holder
//! works with the `Copy`-able [`DeviceObjectId`] observer. Objects are
//! destroyed either explicitly ([`Device::destroy_object`], used by heap
//! eviction) or in bulk when the device itself is torn down — cache teardown
//! always happens first.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::binding::BindingSpace;
use crate::error::Result;
use crate::pipeline::key::PipelineStateDesc;
use crate::ray_tracing::pipeline::{StateObjectDesc, StateObjectKind};
use crate::ray_tracing::shader::ShaderIdentifier;

// ─── Handles ─────────────────────────────────────────────────────────────────

/// Owning handle to a driver-validated native object.
///
/// Move-only: exactly one holder (a cache, or a heap wrapper for unpooled
/// heaps) owns each handle. Use [`DeviceObject::id`] to hand out observer
/// references.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DeviceObject(u64);

impl DeviceObject {
    /// Wraps a raw object id minted by a [`Device`] implementation.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Non-owning observer id for this object.
    #[inline]
    #[must_use]
    pub fn id(&self) -> DeviceObjectId {
        DeviceObjectId(self.0)
    }
}

/// Non-owning observer reference to a [`DeviceObject`].
///
/// Used in cache keys (pipeline keys reference their binding layout by
/// identity) and in descriptions handed back to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceObjectId(u64);

impl DeviceObjectId {
    /// The raw id as minted by the device.
    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// CPU-visible descriptor handle in some staging (non-shader-visible) heap.
///
/// Opaque to this crate; produced by resource-view creation elsewhere and
/// consumed by [`Device::copy_descriptors`]. `Pod` so descriptor arrays can
/// be content-hashed for table de-duplication.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CpuDescriptor(pub u64);

// ─── Descriptor heaps ────────────────────────────────────────────────────────

/// The two classes of GPU-visible descriptor storage the hardware separates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Resource views and constant buffers.
    Resource,
    /// Samplers.
    Sampler,
}

// ─── Device trait ────────────────────────────────────────────────────────────

/// The opaque driver boundary.
///
/// All creation calls may fail with a device-level error (out of memory,
/// invalid parameter, driver-internal error); failures are surfaced to the
/// requesting cache and never retried with identical parameters.
pub trait Device: Send + Sync {
    /// Compiles a full graphics or compute pipeline description into a
    /// native pipeline object.
    ///
    /// `cache_name` is the stable hex rendering of the key's combined hash;
    /// implementations may use it to consult an on-disk pipeline library.
    fn create_pipeline_object(
        &self,
        desc: &PipelineStateDesc<'_>,
        cache_name: &str,
    ) -> Result<DeviceObject>;

    /// Compiles an ordered binding-slot list into a native binding-layout
    /// object for the given binding space.
    fn create_binding_layout_object(
        &self,
        slots: &[crate::binding::BindingSlot],
        space: BindingSpace,
    ) -> Result<DeviceObject>;

    /// Creates a shader-visible descriptor heap.
    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<DeviceObject>;

    /// Builds a ray-tracing state object (a single-shader collection or a
    /// full pipeline linking existing collections) from a subobject list.
    fn create_ray_tracing_state_object(
        &self,
        desc: &StateObjectDesc<'_>,
        kind: StateObjectKind,
    ) -> Result<DeviceObject>;

    /// Looks up the opaque shader identifier for a renamed export inside an
    /// assembled full pipeline.
    fn shader_identifier(
        &self,
        state_object: DeviceObjectId,
        export: &str,
    ) -> Result<ShaderIdentifier>;

    /// Copies `source` descriptors into `dst_heap` starting at `dst_index`.
    fn copy_descriptors(&self, dst_heap: DeviceObjectId, dst_index: u32, source: &[CpuDescriptor]);

    /// Uploads a shader-binding-table byte image into GPU-visible memory and
    /// transitions it for shader-table reads. Returns the backing buffer.
    fn upload_shader_table(&self, data: &[u8], alignment: u32) -> Result<DeviceObject>;

    /// Releases a native object ahead of device teardown. Used by the heap
    /// pool's stale eviction; other objects are destroyed in bulk with the
    /// device.
    fn destroy_object(&self, object: DeviceObject);
}

// ─── Fence ───────────────────────────────────────────────────────────────────

/// Monotonic submission fence.
///
/// The submission layer advances the submitted value once per queue
/// submission and signals completion as the GPU retires work. The caches
/// only ever *poll* — recycling decisions compare recorded values against
/// [`Fence::completed`], never block.
#[derive(Debug, Default)]
pub struct Fence {
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl Fence {
    /// A fresh fence; nothing submitted, nothing completed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent submitted (not necessarily completed) value.
    #[inline]
    #[must_use]
    pub fn current(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    /// The most recent value the GPU is known to have completed.
    #[inline]
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether `value` has completed on the GPU.
    #[inline]
    #[must_use]
    pub fn is_complete(&self, value: u64) -> bool {
        value <= self.completed()
    }

    /// Marks a new submission; returns the value it will signal.
    pub fn advance(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Records GPU completion up to `value`. Values only move forward.
    pub fn signal(&self, value: u64) {
        self.completed.fetch_max(value, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_values_are_monotonic() {
        let fence = Fence::new();
        assert_eq!(fence.current(), 0);
        assert_eq!(fence.advance(), 1);
        assert_eq!(fence.advance(), 2);
        assert_eq!(fence.current(), 2);

        fence.signal(1);
        assert!(fence.is_complete(1));
        assert!(!fence.is_complete(2));

        // Signals never regress.
        fence.signal(0);
        assert_eq!(fence.completed(), 1);
    }

    #[test]
    fn device_object_ids_observe_identity() {
        let a = DeviceObject::from_raw(7);
        let b = DeviceObject::from_raw(7);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().raw(), 7);
    }
}

//! In-use descriptor heap wrappers and descriptor-table de-duplication.
//!
//! A [`BoundDescriptorHeap`] is a pooled heap checked out of the
//! [`DescriptorHeapCache`] for the lifetime of one consumer (typically a
//! shader-binding table). Descriptors are bump-allocated; the wrapper stamps
//! its pool entry with the current fence before going back to the pool.
//!
//! [`DescriptorTableCache`] sits on top: records frequently reference the
//! same descriptor arrays, so arrays are keyed by content hash and identical
//! ones resolve to the same base index without re-copying.

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_64;

use crate::descriptors::heap_cache::{DescriptorHeapCache, HeapCacheEntry};
use crate::device::{CpuDescriptor, DescriptorHeapKind, Device, DeviceObject, DeviceObjectId, Fence};
use crate::error::{Result, RhiError};

/// Largest view heap the pool will recycle. Bigger requests are served
/// unpooled — they are rare enough that recycling buys nothing.
pub const MAX_POOLED_VIEW_DESCRIPTORS: u32 = 1_000_000;
/// Largest sampler heap the pool will recycle.
pub const MAX_POOLED_SAMPLERS: u32 = 2_048;

fn pool_limit(kind: DescriptorHeapKind) -> u32 {
    match kind {
        DescriptorHeapKind::Resource => MAX_POOLED_VIEW_DESCRIPTORS,
        DescriptorHeapKind::Sampler => MAX_POOLED_SAMPLERS,
    }
}

enum HeapBacking {
    Pooled(HeapCacheEntry),
    Unpooled(DeviceObject),
}

/// A shader-visible heap checked out for one consumer, with bump
/// allocation.
///
/// Must be given back with [`release`](Self::release); call
/// [`update_sync_point`](Self::update_sync_point) after every submission
/// that references the heap so the pool cannot recycle it early.
pub struct BoundDescriptorHeap {
    backing: HeapBacking,
    kind: DescriptorHeapKind,
    capacity: u32,
    next_index: u32,
}

impl BoundDescriptorHeap {
    /// Checks a heap of at least `capacity` descriptors out of the pool.
    ///
    /// Requests the pool cannot serve (oversized, or creation failed under
    /// memory pressure) degrade to a caller-owned unpooled heap instead of
    /// failing the frame.
    pub fn acquire(
        cache: &DescriptorHeapCache,
        fence: &Fence,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<Self> {
        if capacity <= pool_limit(kind) {
            match cache.allocate(fence, kind, capacity) {
                Ok(entry) => {
                    let capacity = entry.capacity();
                    return Ok(Self {
                        backing: HeapBacking::Pooled(entry),
                        kind,
                        capacity,
                        next_index: 0,
                    });
                }
                Err(err) => {
                    log::warn!(
                        "descriptor heap pool allocation failed ({kind:?}, {capacity}), \
                         falling back to an unpooled heap: {err}"
                    );
                }
            }
        }

        let heap = cache
            .device()
            .create_descriptor_heap(kind, capacity)
            .map_err(|_| RhiError::DescriptorPoolExhausted { kind, capacity })?;
        Ok(Self {
            backing: HeapBacking::Unpooled(heap),
            kind,
            capacity,
            next_index: 0,
        })
    }

    /// Observer id of the native heap.
    #[must_use]
    pub fn heap(&self) -> DeviceObjectId {
        match &self.backing {
            HeapBacking::Pooled(entry) => entry.heap(),
            HeapBacking::Unpooled(heap) => heap.id(),
        }
    }

    /// Heap kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    /// Total descriptor capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Descriptors handed out so far.
    #[inline]
    #[must_use]
    pub fn allocated(&self) -> u32 {
        self.next_index
    }

    /// Whether `count` more descriptors fit.
    #[inline]
    #[must_use]
    pub fn can_allocate(&self, count: u32) -> bool {
        self.next_index + count <= self.capacity
    }

    /// Bump-allocates `count` descriptors, returning their base index.
    pub fn allocate(&mut self, count: u32) -> u32 {
        assert!(
            self.can_allocate(count),
            "descriptor heap overflow: {} + {count} > {}",
            self.next_index,
            self.capacity
        );
        let base = self.next_index;
        self.next_index += count;
        base
    }

    /// Records that the current submission references this heap.
    pub fn update_sync_point(&mut self, fence: &Fence) {
        if let HeapBacking::Pooled(entry) = &mut self.backing {
            entry.stamp_fence(fence.current());
        }
    }

    /// Returns the heap to the pool (pooled) or destroys it (unpooled).
    pub fn release(self, cache: &DescriptorHeapCache) {
        match self.backing {
            HeapBacking::Pooled(entry) => cache.release(entry),
            HeapBacking::Unpooled(heap) => cache.device().destroy_object(heap),
        }
    }
}

/// De-duplicating descriptor-table allocator over a view heap and a sampler
/// heap.
pub struct DescriptorTableCache {
    view_heap: BoundDescriptorHeap,
    sampler_heap: BoundDescriptorHeap,
    view_tables: FxHashMap<u64, u32>,
    sampler_tables: FxHashMap<u64, u32>,
}

impl DescriptorTableCache {
    /// Checks out one heap of each kind.
    pub fn new(
        cache: &DescriptorHeapCache,
        fence: &Fence,
        num_view_descriptors: u32,
        num_samplers: u32,
    ) -> Result<Self> {
        Ok(Self {
            view_heap: BoundDescriptorHeap::acquire(
                cache,
                fence,
                DescriptorHeapKind::Resource,
                num_view_descriptors,
            )?,
            sampler_heap: BoundDescriptorHeap::acquire(
                cache,
                fence,
                DescriptorHeapKind::Sampler,
                num_samplers,
            )?,
            view_tables: FxHashMap::default(),
            sampler_tables: FxHashMap::default(),
        })
    }

    /// The heap serving `kind`.
    #[must_use]
    pub fn heap(&self, kind: DescriptorHeapKind) -> &BoundDescriptorHeap {
        match kind {
            DescriptorHeapKind::Resource => &self.view_heap,
            DescriptorHeapKind::Sampler => &self.sampler_heap,
        }
    }

    /// Resolves the base index of a descriptor table containing exactly
    /// `descriptors`, copying them into the heap on first sight. Identical
    /// arrays (by content) share one table.
    pub fn table_base_index(
        &mut self,
        device: &dyn Device,
        kind: DescriptorHeapKind,
        descriptors: &[CpuDescriptor],
    ) -> u32 {
        assert!(!descriptors.is_empty());
        let (heap, tables) = match kind {
            DescriptorHeapKind::Resource => (&mut self.view_heap, &mut self.view_tables),
            DescriptorHeapKind::Sampler => (&mut self.sampler_heap, &mut self.sampler_tables),
        };

        let key = xxh3_64(bytemuck::cast_slice(descriptors));
        if let Some(&base) = tables.get(&key) {
            return base;
        }

        let base = heap.allocate(descriptors.len() as u32);
        device.copy_descriptors(heap.heap(), base, descriptors);
        tables.insert(key, base);
        base
    }

    /// Stamps both heaps with the current submission.
    pub fn update_sync_point(&mut self, fence: &Fence) {
        self.view_heap.update_sync_point(fence);
        self.sampler_heap.update_sync_point(fence);
    }

    /// Returns both heaps to the pool.
    pub fn release(self, cache: &DescriptorHeapCache) {
        self.view_heap.release(cache);
        self.sampler_heap.release(cache);
    }
}

//! Fence-gated descriptor-heap pool.
//!
//! Heap creation is a driver round-trip, so freed heaps circulate through a
//! free list instead of being destroyed. An entry becomes reusable only once
//! the GPU has completed the submission recorded in its fence value — the
//! releasing caller is responsible for stamping the *current* (not yet
//! completed) fence before handing the entry back.
//!
//! First-fit, not best-fit: the free list is short and allocation happens a
//! handful of times per frame. Entries that sit unused for more than the
//! staleness window are destroyed on the next allocation so the pool cannot
//! grow without bound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{DescriptorHeapKind, Device, DeviceObject, DeviceObjectId, Fence};
use crate::error::Result;

/// Free-list entries unused for this many submissions are destroyed.
pub const DEFAULT_STALE_SUBMISSION_WINDOW: u64 = 100;

/// One pooled heap: the native object, its shape, and the last submission
/// that may still reference it.
#[derive(Debug)]
pub struct HeapCacheEntry {
    heap: DeviceObject,
    kind: DescriptorHeapKind,
    capacity: u32,
    fence_value: u64,
}

impl HeapCacheEntry {
    /// Observer id of the native heap.
    #[inline]
    #[must_use]
    pub fn heap(&self) -> DeviceObjectId {
        self.heap.id()
    }

    /// Heap kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    /// Descriptor capacity; may exceed what was requested when a larger
    /// pooled heap was recycled.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The last submission that may reference this heap.
    #[inline]
    #[must_use]
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    /// Stamps the entry with a submission value. Values only move forward;
    /// call with [`Fence::current`] before releasing the entry.
    pub fn stamp_fence(&mut self, value: u64) {
        self.fence_value = self.fence_value.max(value);
    }
}

/// Pool of shader-visible descriptor heaps, recycled across submissions.
///
/// Invariant: an entry is reachable from at most one of {an in-use wrapper,
/// the free list} at any time — [`allocate`](Self::allocate) moves entries
/// out by value and [`release`](Self::release) moves them back.
pub struct DescriptorHeapCache {
    device: Arc<dyn Device>,
    entries: Mutex<Vec<HeapCacheEntry>>,
    stale_window: u64,
    allocated: AtomicUsize,
}

impl DescriptorHeapCache {
    #[must_use]
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self::with_stale_window(device, DEFAULT_STALE_SUBMISSION_WINDOW)
    }

    /// Pool with a custom staleness window.
    #[must_use]
    pub fn with_stale_window(device: Arc<dyn Device>, stale_window: u64) -> Self {
        Self {
            device,
            entries: Mutex::new(Vec::new()),
            stale_window,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Takes a heap of at least `capacity` descriptors of `kind`.
    ///
    /// Scans the free list for the first entry whose kind matches, whose
    /// capacity suffices and whose recorded submission has completed on the
    /// GPU; creates a fresh heap otherwise. Heap creation happens with the
    /// pool mutex held, so lock hold time is bounded by the driver call on
    /// the miss path only.
    pub fn allocate(
        &self,
        fence: &Fence,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<HeapCacheEntry> {
        let completed = fence.completed();
        let mut entries = self.entries.lock();

        let found = entries.iter().position(|entry| {
            entry.kind == kind && entry.capacity >= capacity && entry.fence_value <= completed
        });

        if let Some(index) = found {
            let entry = entries.swap_remove(index);
            self.evict_stale(&mut entries, completed);
            self.allocated.fetch_add(1, Ordering::Relaxed);
            log::trace!(
                "recycled {:?} descriptor heap ({} descriptors, fence {})",
                kind,
                entry.capacity,
                entry.fence_value
            );
            return Ok(entry);
        }

        // No reusable entry: shed heaps nobody touched for the whole
        // staleness window, then create.
        self.evict_stale(&mut entries, completed);

        let heap = self.device.create_descriptor_heap(kind, capacity)?;
        self.allocated.fetch_add(1, Ordering::Relaxed);
        log::debug!("created {kind:?} descriptor heap ({capacity} descriptors)");
        Ok(HeapCacheEntry {
            heap,
            kind,
            capacity,
            fence_value: 0,
        })
    }

    /// Returns an entry to the free list.
    ///
    /// The caller must have stamped the entry's fence value with the current
    /// submission ([`HeapCacheEntry::stamp_fence`]); otherwise a later
    /// allocation could hand the heap out while the GPU still reads it.
    pub fn release(&self, entry: HeapCacheEntry) {
        self.allocated.fetch_sub(1, Ordering::Relaxed);
        self.entries.lock().push(entry);
    }

    fn evict_stale(&self, entries: &mut Vec<HeapCacheEntry>, completed: u64) {
        let mut index = 0;
        while index < entries.len() {
            if entries[index].fence_value + self.stale_window <= completed {
                let entry = entries.swap_remove(index);
                log::trace!(
                    "evicting stale {:?} descriptor heap ({} descriptors, fence {})",
                    entry.kind,
                    entry.capacity,
                    entry.fence_value
                );
                self.device.destroy_object(entry.heap);
            } else {
                index += 1;
            }
        }
    }

    pub(crate) fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Entries currently in the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Entries currently held by in-use wrappers.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Drop for DescriptorHeapCache {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().drain(..) {
            self.device.destroy_object(entry.heap);
        }
    }
}

impl std::fmt::Debug for DescriptorHeapCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorHeapCache")
            .field("free", &self.free_count())
            .field("allocated", &self.allocated_count())
            .field("stale_window", &self.stale_window)
            .finish()
    }
}

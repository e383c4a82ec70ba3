//! Descriptor-heap pool tests.
//!
//! Covers:
//! - fence-gated recycling: no reuse before GPU completion
//! - first-fit matching by kind and capacity
//! - stale-entry eviction bound after every allocation
//! - bound-heap wrappers: bump allocation, sync points, table de-dup

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::MockDevice;
use kiln_rhi::descriptors::heap_cache::DescriptorHeapCache;
use kiln_rhi::descriptors::table_cache::{BoundDescriptorHeap, DescriptorTableCache};
use kiln_rhi::device::CpuDescriptor;
use kiln_rhi::{DescriptorHeapKind, Device, Fence};

fn device_and_cache() -> (Arc<MockDevice>, DescriptorHeapCache) {
    let device = Arc::new(MockDevice::new());
    let cache = DescriptorHeapCache::new(device.clone() as Arc<dyn Device>);
    (device, cache)
}

// ============================================================================
// Recycling
// ============================================================================

#[test]
fn released_entry_is_not_reused_before_fence_completion() {
    let (device, cache) = device_and_cache();
    let fence = Fence::new();

    let mut entry = cache
        .allocate(&fence, DescriptorHeapKind::Resource, 128)
        .unwrap();
    let first_heap = entry.heap();

    // The entry was referenced by a submission that has not completed.
    let submitted = fence.advance();
    entry.stamp_fence(fence.current());
    cache.release(entry);

    let fresh = cache
        .allocate(&fence, DescriptorHeapKind::Resource, 128)
        .unwrap();
    assert_ne!(fresh.heap(), first_heap, "in-flight heap must not be reused");
    assert_eq!(device.heap_creations.load(Ordering::SeqCst), 2);
    cache.release(fresh);

    // Once the GPU catches up the original entry becomes reusable.
    fence.signal(submitted);
    let recycled = cache
        .allocate(&fence, DescriptorHeapKind::Resource, 128)
        .unwrap();
    assert_eq!(recycled.heap(), first_heap);
    assert_eq!(device.heap_creations.load(Ordering::SeqCst), 2);
    cache.release(recycled);
}

#[test]
fn first_fit_respects_kind_and_capacity() {
    let (device, cache) = device_and_cache();
    let fence = Fence::new();

    let small = cache
        .allocate(&fence, DescriptorHeapKind::Resource, 64)
        .unwrap();
    let sampler = cache
        .allocate(&fence, DescriptorHeapKind::Sampler, 64)
        .unwrap();
    let small_heap = small.heap();
    cache.release(small);
    cache.release(sampler);

    // A bigger request cannot reuse the small heap.
    let big = cache
        .allocate(&fence, DescriptorHeapKind::Resource, 256)
        .unwrap();
    assert_ne!(big.heap(), small_heap);

    // A matching request finds the free small heap even with the sampler
    // entry in front of it.
    let reused = cache
        .allocate(&fence, DescriptorHeapKind::Resource, 32)
        .unwrap();
    assert_eq!(reused.heap(), small_heap);
    assert!(reused.capacity() >= 32);
    assert_eq!(device.heap_creations.load(Ordering::SeqCst), 3);
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn stale_entries_are_destroyed_on_allocate() {
    let device = Arc::new(MockDevice::new());
    let cache = DescriptorHeapCache::with_stale_window(device.clone() as Arc<dyn Device>, 10);
    let fence = Fence::new();

    let mut entry = cache
        .allocate(&fence, DescriptorHeapKind::Resource, 64)
        .unwrap();
    let stale_id = entry.heap().raw();
    let submitted = fence.advance();
    entry.stamp_fence(fence.current());
    cache.release(entry);

    // Let the GPU run far past the staleness window.
    for _ in 0..12 {
        fence.advance();
    }
    fence.signal(submitted + 11);

    // The next allocation cannot use the sampler-kind mismatch, so it
    // creates — and must destroy the stale resource entry first.
    let sampler = cache
        .allocate(&fence, DescriptorHeapKind::Sampler, 16)
        .unwrap();
    assert!(device.destroyed_ids().contains(&stale_id));
    assert_eq!(cache.free_count(), 0);
    cache.release(sampler);
}

#[test]
fn eviction_runs_even_on_pooled_hits() {
    let device = Arc::new(MockDevice::new());
    let cache = DescriptorHeapCache::with_stale_window(device.clone() as Arc<dyn Device>, 10);
    let fence = Fence::new();

    // A resource entry to recycle and a sampler entry left to go stale.
    let mut resource = cache
        .allocate(&fence, DescriptorHeapKind::Resource, 64)
        .unwrap();
    let mut sampler = cache
        .allocate(&fence, DescriptorHeapKind::Sampler, 16)
        .unwrap();
    let resource_heap = resource.heap();
    let stale_id = sampler.heap().raw();

    fence.advance();
    sampler.stamp_fence(fence.current()); // fence 1
    cache.release(sampler);
    for _ in 0..4 {
        fence.advance();
    }
    resource.stamp_fence(fence.current()); // fence 5
    cache.release(resource);

    // Completed 12: the sampler entry is past the window (1 + 10 <= 12),
    // the resource entry is not (5 + 10 > 12).
    for _ in 0..7 {
        fence.advance();
    }
    fence.signal(12);

    let hit = cache
        .allocate(&fence, DescriptorHeapKind::Resource, 64)
        .unwrap();
    assert_eq!(hit.heap(), resource_heap, "expected a pooled hit");
    assert!(device.destroyed_ids().contains(&stale_id));
    assert_eq!(cache.free_count(), 0);
    cache.release(hit);
}

// ============================================================================
// Bound heaps and table de-duplication
// ============================================================================

#[test]
fn bound_heap_bump_allocates_and_stamps_sync_points() {
    let (_device, cache) = device_and_cache();
    let fence = Fence::new();

    let mut heap =
        BoundDescriptorHeap::acquire(&cache, &fence, DescriptorHeapKind::Resource, 100).unwrap();
    assert!(heap.can_allocate(100));
    assert_eq!(heap.allocate(40), 0);
    assert_eq!(heap.allocate(40), 40);
    assert!(!heap.can_allocate(40));

    fence.advance();
    heap.update_sync_point(&fence);
    heap.release(&cache);

    // Unsignaled fence: the released entry must not come back yet.
    let other =
        BoundDescriptorHeap::acquire(&cache, &fence, DescriptorHeapKind::Resource, 100).unwrap();
    assert_eq!(other.allocated(), 0);
    other.release(&cache);
}

#[test]
fn identical_descriptor_arrays_share_one_table() {
    let (device, cache) = device_and_cache();
    let fence = Fence::new();
    let mut tables = DescriptorTableCache::new(&cache, &fence, 256, 32).unwrap();

    let descriptors = [CpuDescriptor(10), CpuDescriptor(11), CpuDescriptor(12)];
    let base_a = tables.table_base_index(
        device.as_ref(),
        DescriptorHeapKind::Resource,
        &descriptors,
    );
    let base_b = tables.table_base_index(
        device.as_ref(),
        DescriptorHeapKind::Resource,
        &descriptors,
    );
    assert_eq!(base_a, base_b);
    assert_eq!(device.descriptor_copies.load(Ordering::SeqCst), 1);

    // A different array allocates a fresh range past the first.
    let other = [CpuDescriptor(99)];
    let base_c = tables.table_base_index(device.as_ref(), DescriptorHeapKind::Resource, &other);
    assert_eq!(base_c, descriptors.len() as u32);
    assert_eq!(device.descriptor_copies.load(Ordering::SeqCst), 2);

    // Sampler tables de-duplicate independently.
    let samplers = [CpuDescriptor(10)];
    let base_s = tables.table_base_index(device.as_ref(), DescriptorHeapKind::Sampler, &samplers);
    assert_eq!(base_s, 0);

    tables.update_sync_point(&fence);
    tables.release(&cache);
}

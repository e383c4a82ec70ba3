//! GPU-visible descriptor storage pooling.
//!
//! [`heap_cache`] recycles whole shader-visible heaps across submissions,
//! gated on fence completion so the GPU never reads a heap that was handed
//! to a new owner. [`table_cache`] wraps an in-use heap with bump allocation
//! and de-duplicates identical descriptor arrays by content hash.

pub mod heap_cache;
pub mod table_cache;

pub use heap_cache::{DescriptorHeapCache, HeapCacheEntry, DEFAULT_STALE_SUBMISSION_WINDOW};
pub use table_cache::{BoundDescriptorHeap, DescriptorTableCache};

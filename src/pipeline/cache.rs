//! The pipeline-state cache.
//!
//! Double-checked creation: the map is consulted under a shared lock, a
//! placeholder entry is inserted under the exclusive lock, and the expensive
//! device call happens with no lock held at all — N threads requesting N
//! *different* keys compile in parallel. Threads that lose the race on the
//! *same* key receive the placeholder and block on its condition variable
//! until the winner publishes the created (or failed) object.
//!
//! Entries live for the cache's lifetime. A failed creation stays in the map
//! as invalid so every subsequent request for that key observes the same
//! uniform failure instead of re-driving the driver.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::device::{Device, DeviceObject, DeviceObjectId};
use crate::error::{Result, RhiError};
use crate::pipeline::key::{ComputePipelineDesc, GraphicsPipelineDesc, PipelineStateDesc};

// ─── Cache entry ─────────────────────────────────────────────────────────────

enum CreationState {
    /// Inserted, native object not constructed yet.
    Pending,
    /// Device creation succeeded.
    Created(DeviceObject),
    /// Device creation failed; the reason is replayed to every caller.
    Failed(String),
}

/// A cached pipeline entry: exactly one of pending, created or failed.
///
/// Shared via `Arc`; identity equality of the `Arc` is the cache-idempotence
/// guarantee.
pub struct PipelineState {
    kind: &'static str,
    combined_hash: u64,
    state: Mutex<CreationState>,
    ready: Condvar,
}

impl PipelineState {
    fn new(kind: &'static str, combined_hash: u64) -> Self {
        Self {
            kind,
            combined_hash,
            state: Mutex::new(CreationState::Pending),
            ready: Condvar::new(),
        }
    }

    /// Combined hash this entry was created for.
    #[inline]
    #[must_use]
    pub fn combined_hash(&self) -> u64 {
        self.combined_hash
    }

    /// Non-blocking peek: the native object if creation already succeeded.
    #[must_use]
    pub fn native(&self) -> Option<DeviceObjectId> {
        match &*self.state.lock() {
            CreationState::Created(object) => Some(object.id()),
            _ => None,
        }
    }

    /// Whether the entry holds a valid native object. Pending entries are
    /// not yet valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.native().is_some()
    }

    /// Blocks until creation completes, then returns the native object or
    /// the creation failure.
    pub fn wait_ready(&self) -> Result<DeviceObjectId> {
        let mut state = self.state.lock();
        while matches!(*state, CreationState::Pending) {
            self.ready.wait(&mut state);
        }
        match &*state {
            CreationState::Created(object) => Ok(object.id()),
            CreationState::Failed(reason) => Err(RhiError::DeviceObjectCreationFailed {
                kind: self.kind,
                key: self.combined_hash,
                reason: reason.clone(),
            }),
            CreationState::Pending => unreachable!(),
        }
    }

    fn publish(&self, result: Result<DeviceObject>) {
        let mut state = self.state.lock();
        debug_assert!(matches!(*state, CreationState::Pending));
        *state = match result {
            Ok(object) => CreationState::Created(object),
            Err(err) => CreationState::Failed(err.to_string()),
        };
        drop(state);
        self.ready.notify_all();
    }
}

impl std::fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineState")
            .field("kind", &self.kind)
            .field("combined_hash", &format_args!("{:#018x}", self.combined_hash))
            .field("valid", &self.is_valid())
            .finish()
    }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

type PipelineMap = RwLock<FxHashMap<u64, Arc<PipelineState>>>;

/// Owner of every compiled graphics and compute pipeline object, keyed by
/// combined hash.
pub struct PipelineCache {
    device: Arc<dyn Device>,
    graphics: PipelineMap,
    compute: PipelineMap,
}

impl PipelineCache {
    #[must_use]
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            graphics: RwLock::new(FxHashMap::default()),
            compute: RwLock::new(FxHashMap::default()),
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Read-only lookup of a graphics pipeline by combined hash.
    #[must_use]
    pub fn find_graphics(&self, combined_hash: u64) -> Option<Arc<PipelineState>> {
        Self::find(&self.graphics, combined_hash)
    }

    /// Read-only lookup of a compute pipeline by combined hash.
    #[must_use]
    pub fn find_compute(&self, combined_hash: u64) -> Option<Arc<PipelineState>> {
        Self::find(&self.compute, combined_hash)
    }

    fn find(map: &PipelineMap, combined_hash: u64) -> Option<Arc<PipelineState>> {
        assert_ne!(combined_hash, 0, "zero is the reserved unset hash");
        map.read().get(&combined_hash).cloned()
    }

    // ── Creation ─────────────────────────────────────────────────────────────

    /// Resolves the pipeline for `desc`, creating it on first sight.
    ///
    /// Returns once the entry holds a valid native object; a creation
    /// failure is returned to every caller that requested the key and is not
    /// retried.
    pub fn get_or_create_graphics(
        &self,
        desc: &GraphicsPipelineDesc,
    ) -> Result<Arc<PipelineState>> {
        let hash = desc.combined_hash();
        self.get_or_create(
            &self.graphics,
            "graphics pipeline state",
            hash,
            &PipelineStateDesc::Graphics(desc),
        )
    }

    /// Resolves the pipeline for `desc`, creating it on first sight.
    pub fn get_or_create_compute(&self, desc: &ComputePipelineDesc) -> Result<Arc<PipelineState>> {
        let hash = desc.combined_hash();
        self.get_or_create(
            &self.compute,
            "compute pipeline state",
            hash,
            &PipelineStateDesc::Compute(desc),
        )
    }

    fn get_or_create(
        &self,
        map: &PipelineMap,
        kind: &'static str,
        combined_hash: u64,
        desc: &PipelineStateDesc<'_>,
    ) -> Result<Arc<PipelineState>> {
        assert_ne!(combined_hash, 0, "zero is the reserved unset hash");

        // Fast path: shared lock only. The guard must drop before waiting,
        // or a slow creation would stall unrelated inserts.
        let cached = map.read().get(&combined_hash).cloned();
        if let Some(entry) = cached {
            entry.wait_ready()?;
            return Ok(entry);
        }

        // Re-check under the exclusive lock, insert the placeholder if still
        // absent, and release the lock before touching the device.
        let (entry, inserted) = {
            let mut guard = map.write();
            match guard.entry(combined_hash) {
                std::collections::hash_map::Entry::Occupied(occupied) => {
                    (occupied.get().clone(), false)
                }
                std::collections::hash_map::Entry::Vacant(vacant) => {
                    let entry = Arc::new(PipelineState::new(kind, combined_hash));
                    vacant.insert(entry.clone());
                    (entry, true)
                }
            }
        };

        if inserted {
            let cache_name = format!("{combined_hash:016x}");
            let result = self.device.create_pipeline_object(desc, &cache_name);
            match &result {
                Ok(_) => log::debug!("created {kind} {combined_hash:#018x}"),
                Err(err) => log::error!("{kind} creation failed ({combined_hash:#018x}): {err}"),
            }
            entry.publish(result);
        }

        entry.wait_ready()?;
        Ok(entry)
    }

    // ── Stats ────────────────────────────────────────────────────────────────

    /// Number of cached graphics pipelines (valid, pending and failed).
    #[must_use]
    pub fn graphics_count(&self) -> usize {
        self.graphics.read().len()
    }

    /// Number of cached compute pipelines (valid, pending and failed).
    #[must_use]
    pub fn compute_count(&self) -> usize {
        self.compute.read().len()
    }
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("graphics", &self.graphics_count())
            .field("compute", &self.compute_count())
            .finish()
    }
}

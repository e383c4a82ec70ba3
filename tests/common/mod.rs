//! Shared mock device for integration tests.
//!
//! Counts every creation call so tests can assert single-creation
//! guarantees, and can be switched into failure mode to exercise the
//! invalid-entry paths.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use kiln_rhi::binding::BindingSlot;
use kiln_rhi::device::{CpuDescriptor, DescriptorHeapKind, DeviceObject, DeviceObjectId};
use kiln_rhi::pipeline::PipelineStateDesc;
use kiln_rhi::ray_tracing::pipeline::{StateObjectDesc, StateObjectKind};
use kiln_rhi::ray_tracing::shader::{ShaderIdentifier, SHADER_IDENTIFIER_SIZE};
use kiln_rhi::{BindingSpace, Device, Result, RhiError};

#[derive(Default)]
pub struct MockDevice {
    next_id: AtomicU64,
    pub pipeline_creations: AtomicUsize,
    pub layout_creations: AtomicUsize,
    pub heap_creations: AtomicUsize,
    pub state_object_creations: AtomicUsize,
    pub descriptor_copies: AtomicUsize,
    pub table_uploads: AtomicUsize,
    pub destroyed: Mutex<Vec<u64>>,
    /// When set, pipeline creation fails like a driver rejection.
    pub fail_pipelines: AtomicBool,
    /// Extra latency per pipeline creation, to widen race windows.
    pub pipeline_delay: Mutex<Option<Duration>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&self) -> DeviceObject {
        DeviceObject::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn destroyed_ids(&self) -> Vec<u64> {
        self.destroyed.lock().unwrap().clone()
    }
}

impl Device for MockDevice {
    fn create_pipeline_object(
        &self,
        _desc: &PipelineStateDesc<'_>,
        _cache_name: &str,
    ) -> Result<DeviceObject> {
        if let Some(delay) = *self.pipeline_delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        self.pipeline_creations.fetch_add(1, Ordering::SeqCst);
        if self.fail_pipelines.load(Ordering::SeqCst) {
            return Err(RhiError::DeviceOutOfMemory {
                kind: "pipeline state",
            });
        }
        Ok(self.mint())
    }

    fn create_binding_layout_object(
        &self,
        _slots: &[BindingSlot],
        _space: BindingSpace,
    ) -> Result<DeviceObject> {
        self.layout_creations.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint())
    }

    fn create_descriptor_heap(
        &self,
        _kind: DescriptorHeapKind,
        _capacity: u32,
    ) -> Result<DeviceObject> {
        self.heap_creations.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint())
    }

    fn create_ray_tracing_state_object(
        &self,
        _desc: &StateObjectDesc<'_>,
        _kind: StateObjectKind,
    ) -> Result<DeviceObject> {
        self.state_object_creations.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint())
    }

    fn shader_identifier(
        &self,
        _state_object: DeviceObjectId,
        export: &str,
    ) -> Result<ShaderIdentifier> {
        // Deterministic identifier derived from the export name.
        let hash = xxhash_rust::xxh3::xxh3_64(export.as_bytes()).max(1);
        let mut bytes = [0u8; SHADER_IDENTIFIER_SIZE];
        for chunk in bytes.chunks_exact_mut(8) {
            chunk.copy_from_slice(&hash.to_le_bytes());
        }
        Ok(ShaderIdentifier::from_bytes(&bytes))
    }

    fn copy_descriptors(
        &self,
        _dst_heap: DeviceObjectId,
        _dst_index: u32,
        _source: &[CpuDescriptor],
    ) {
        self.descriptor_copies.fetch_add(1, Ordering::SeqCst);
    }

    fn upload_shader_table(&self, _data: &[u8], _alignment: u32) -> Result<DeviceObject> {
        self.table_uploads.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint())
    }

    fn destroy_object(&self, object: DeviceObject) {
        self.destroyed.lock().unwrap().push(object.id().raw());
    }
}

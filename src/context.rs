//! The per-device cache owner.
//!
//! One [`DeviceContext`] exists per logical device. It owns every cache in
//! this crate plus the submission fence, giving the whole caching layer an
//! explicit lifetime: construct it with the device, drop it before the
//! device. There is no global state — two devices get two fully independent
//! contexts.

use std::sync::Arc;

use crate::binding::{BindingTier, QuantizedBindingLayout, RootSignature, RootSignatureCache};
use crate::descriptors::{DescriptorHeapCache, DescriptorTableCache};
use crate::device::{Device, Fence};
use crate::error::Result;
use crate::pipeline::PipelineCache;
use crate::ray_tracing::collection::CollectionCache;
use crate::ray_tracing::pipeline::{RayTracingPipeline, RayTracingPipelineDesc};
use crate::ray_tracing::shader_table::{ShaderBindingTable, ShaderBindingTableDesc};

/// Owns all resource-object caches of one device.
pub struct DeviceContext {
    // Caches are declared before the device handle so they drop first.
    fence: Fence,
    root_signatures: RootSignatureCache,
    pipelines: PipelineCache,
    collections: CollectionCache,
    descriptor_heaps: DescriptorHeapCache,
    binding_tier: BindingTier,
    device: Arc<dyn Device>,
}

impl DeviceContext {
    /// Builds the caching layer for `device`.
    ///
    /// `binding_tier` is the device's reported binding capability class; it
    /// governs how aggressively binding layouts quantize.
    pub fn new(device: Arc<dyn Device>, binding_tier: BindingTier) -> Result<Self> {
        Ok(Self {
            fence: Fence::new(),
            root_signatures: RootSignatureCache::new(device.clone()),
            pipelines: PipelineCache::new(device.clone()),
            collections: CollectionCache::new(device.clone())?,
            descriptor_heaps: DescriptorHeapCache::new(device.clone()),
            binding_tier,
            device,
        })
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// The submission fence the recycling caches poll.
    #[inline]
    #[must_use]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    #[inline]
    #[must_use]
    pub fn binding_tier(&self) -> BindingTier {
        self.binding_tier
    }

    #[inline]
    #[must_use]
    pub fn root_signatures(&self) -> &RootSignatureCache {
        &self.root_signatures
    }

    #[inline]
    #[must_use]
    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    #[inline]
    #[must_use]
    pub fn collections(&self) -> &CollectionCache {
        &self.collections
    }

    #[inline]
    #[must_use]
    pub fn descriptor_heaps(&self) -> &DescriptorHeapCache {
        &self.descriptor_heaps
    }

    /// Resolves the compiled binding layout for `layout`.
    pub fn get_or_create_root_signature(
        &self,
        layout: &QuantizedBindingLayout,
    ) -> Result<Arc<RootSignature>> {
        self.root_signatures.get_or_create(layout)
    }

    /// Links a full ray-tracing pipeline through the collection cache.
    pub fn assemble_ray_tracing_pipeline(
        &self,
        desc: &RayTracingPipelineDesc,
    ) -> Result<RayTracingPipeline> {
        RayTracingPipeline::assemble(self.device.as_ref(), &self.collections, desc)
    }

    /// Builds a shader-binding table, checking record-local descriptor heaps
    /// out of the pool when the table binds local resources.
    pub fn create_shader_table(
        &self,
        desc: &ShaderBindingTableDesc,
    ) -> Result<(ShaderBindingTable, Option<DescriptorTableCache>)> {
        let table = ShaderBindingTable::new(desc);
        let descriptor_cache = if desc.needs_descriptor_cache() {
            Some(DescriptorTableCache::new(
                &self.descriptor_heaps,
                &self.fence,
                desc.required_view_descriptors(),
                crate::descriptors::table_cache::MAX_POOLED_SAMPLERS,
            )?)
        } else {
            None
        };
        Ok((table, descriptor_cache))
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("binding_tier", &self.binding_tier)
            .field("root_signatures", &self.root_signatures)
            .field("pipelines", &self.pipelines)
            .field("collections", &self.collections)
            .field("descriptor_heaps", &self.descriptor_heaps)
            .finish()
    }
}

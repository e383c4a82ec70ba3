//! Ray-tracing cache and shader-table tests.
//!
//! Covers:
//! - collection cache keying (shader, layouts, payload) and reuse across
//!   pipeline assemblies
//! - hit-group export renaming
//! - full-pipeline assembly: identifier queries and the default table
//! - shader-table construction through the device context, including the
//!   record-local descriptor cache

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::MockDevice;
use kiln_rhi::binding::{BindingSpace, QuantizedBindingLayout, RootSignature};
use kiln_rhi::pipeline::ShaderBytecode;
use kiln_rhi::ray_tracing::pipeline::RayTracingPipelineDesc;
use kiln_rhi::ray_tracing::shader::{RayTracingShader, RayTracingShaderKind};
use kiln_rhi::ray_tracing::shader_table::{ShaderBindingTableDesc, TABLE_BYTE_ALIGNMENT};
use kiln_rhi::{BindingTier, DeviceContext, ResourceCounts};

struct Fixture {
    device: Arc<MockDevice>,
    ctx: DeviceContext,
    global: Arc<RootSignature>,
    local: Arc<RootSignature>,
}

fn fixture() -> Fixture {
    let device = Arc::new(MockDevice::new());
    let ctx = DeviceContext::new(
        device.clone() as Arc<dyn kiln_rhi::Device>,
        BindingTier::Three,
    )
    .unwrap();

    let global_layout = QuantizedBindingLayout::for_ray_tracing(
        ctx.binding_tier(),
        ResourceCounts {
            views: 4,
            rw_views: 1,
            constant_buffers: 1,
            ..ResourceCounts::default()
        },
        BindingSpace::RayTracingGlobal,
    );
    let local_layout = QuantizedBindingLayout::for_ray_tracing(
        ctx.binding_tier(),
        ResourceCounts {
            views: 2,
            constant_buffers: 1,
            ..ResourceCounts::default()
        },
        BindingSpace::RayTracingLocal,
    );
    let global = ctx.get_or_create_root_signature(&global_layout).unwrap();
    let local = ctx.get_or_create_root_signature(&local_layout).unwrap();

    Fixture {
        device,
        ctx,
        global,
        local,
    }
}

fn shader(
    fixture: &Fixture,
    kind: RayTracingShaderKind,
    bytes: &[u8],
    entry: &str,
) -> Arc<RayTracingShader> {
    let signature = match kind {
        RayTracingShaderKind::RayGen | RayTracingShaderKind::Miss => fixture.global.clone(),
        RayTracingShaderKind::HitGroup | RayTracingShaderKind::Callable => fixture.local.clone(),
    };
    Arc::new(RayTracingShader::new(
        kind,
        ShaderBytecode::new(bytes.to_vec()),
        entry,
        ResourceCounts {
            views: 2,
            constant_buffers: 1,
            ..ResourceCounts::default()
        },
        signature,
    ))
}

fn pipeline_desc(fixture: &Fixture) -> RayTracingPipelineDesc {
    RayTracingPipelineDesc {
        ray_gen: vec![shader(fixture, RayTracingShaderKind::RayGen, b"rgs", "MainRGS")],
        miss: vec![shader(fixture, RayTracingShaderKind::Miss, b"miss", "MainMS")],
        hit_groups: vec![shader(
            fixture,
            RayTracingShaderKind::HitGroup,
            b"hit",
            "MainCHS",
        )],
        callable: vec![],
        max_payload_size: 16,
        allow_hit_group_indexing: true,
    }
}

// ============================================================================
// Collection cache
// ============================================================================

#[test]
fn collections_are_reused_across_pipelines() {
    let f = fixture();
    let desc = pipeline_desc(&f);

    let first = f.ctx.assemble_ray_tracing_pipeline(&desc).unwrap();
    let after_first = f.device.state_object_creations.load(Ordering::SeqCst);
    // One collection per distinct shader plus the linked pipeline.
    assert_eq!(after_first, 4);
    assert_eq!(f.ctx.collections().len(), 3);

    let second = f.ctx.assemble_ray_tracing_pipeline(&desc).unwrap();
    let after_second = f.device.state_object_creations.load(Ordering::SeqCst);
    // Re-link only: every collection came from the cache.
    assert_eq!(after_second, after_first + 1);
    assert_eq!(f.ctx.collections().len(), 3);

    assert_ne!(first.state_object(), second.state_object());
}

#[test]
fn payload_size_is_part_of_the_collection_key() {
    let f = fixture();
    let rgs = shader(&f, RayTracingShaderKind::RayGen, b"rgs", "MainRGS");

    let a = f
        .ctx
        .collections()
        .get_or_compile(&rgs, f.global.id(), 16)
        .unwrap();
    let b = f
        .ctx
        .collections()
        .get_or_compile(&rgs, f.global.id(), 16)
        .unwrap();
    let c = f
        .ctx
        .collections()
        .get_or_compile(&rgs, f.global.id(), 32)
        .unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(f.ctx.collections().len(), 2);
}

#[test]
fn hit_group_collections_export_renamed_entry_points() {
    let f = fixture();
    let hit = Arc::new(
        RayTracingShader::new(
            RayTracingShaderKind::HitGroup,
            ShaderBytecode::new(b"hit-full".to_vec()),
            "ClosestHitMain",
            ResourceCounts::default(),
            f.local.clone(),
        )
        .with_any_hit("AnyHitMain")
        .with_intersection("IntersectMain"),
    );

    let collection = f
        .ctx
        .collections()
        .get_or_compile(&hit, f.global.id(), 16)
        .unwrap();

    let exports = collection.exports();
    assert_eq!(exports.len(), 4);
    let hash = hit.content_hash();
    assert_eq!(collection.primary_export(), format!("HitGroup_{hash:016x}"));
    assert_eq!(exports[1], format!("CHS_{hash:016x}"));
    assert_eq!(exports[2], format!("AHS_{hash:016x}"));
    assert_eq!(exports[3], format!("IS_{hash:016x}"));
}

// ============================================================================
// Pipeline assembly
// ============================================================================

#[test]
fn assembled_pipelines_carry_valid_identifiers() {
    let f = fixture();
    let pipeline = f.ctx.assemble_ray_tracing_pipeline(&pipeline_desc(&f)).unwrap();

    assert_eq!(pipeline.ray_gen().len(), 1);
    assert_eq!(pipeline.miss().len(), 1);
    assert_eq!(pipeline.hit_groups().len(), 1);
    for id in pipeline
        .ray_gen()
        .identifiers()
        .iter()
        .chain(pipeline.miss().identifiers())
        .chain(pipeline.hit_groups().identifiers())
    {
        assert!(id.is_valid());
        assert!(!id.is_null());
    }
    assert!(pipeline.allow_hit_group_indexing());
    assert_eq!(pipeline.global_layout(), f.global.id());
    // Local record limits come from the hit shader's layout.
    assert_eq!(
        pipeline.max_local_root_data_size(),
        f.local.size_bytes()
    );
}

#[test]
fn default_table_is_ready_after_upload() {
    let f = fixture();
    let mut pipeline = f.ctx.assemble_ray_tracing_pipeline(&pipeline_desc(&f)).unwrap();

    assert!(pipeline.default_table().is_dirty());
    pipeline
        .default_table_mut()
        .upload(f.device.as_ref())
        .unwrap();
    assert!(!pipeline.default_table().is_dirty());
    assert_eq!(f.device.table_uploads.load(Ordering::SeqCst), 1);

    // The default table never indexes hit records.
    let regions = pipeline.default_table().dispatch_regions(0, 0, false);
    assert_eq!(regions.hit_group.stride, 0);
    assert_eq!(regions.hit_group.size, u64::from(TABLE_BYTE_ALIGNMENT));

    // A second upload with no writes is a no-op.
    pipeline
        .default_table_mut()
        .upload(f.device.as_ref())
        .unwrap();
    assert_eq!(f.device.table_uploads.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Shader tables through the context
// ============================================================================

#[test]
fn context_attaches_descriptor_cache_for_local_records() {
    let f = fixture();
    let pipeline = f.ctx.assemble_ray_tracing_pipeline(&pipeline_desc(&f)).unwrap();

    let desc = ShaderBindingTableDesc {
        num_ray_gen_records: 1,
        num_miss_records: 1,
        num_hit_records: 8,
        num_callable_records: 0,
        local_root_data_size: pipeline.max_local_root_data_size(),
        max_view_descriptors_per_record: pipeline.max_hit_view_descriptors(),
    };
    let (mut table, descriptor_cache) = f.ctx.create_shader_table(&desc).unwrap();
    let mut descriptor_cache = descriptor_cache.expect("local records need a descriptor cache");

    table.set_ray_gen_identifier(0, pipeline.shader_identifier(RayTracingShaderKind::RayGen, 0));
    table.set_miss_identifier(0, pipeline.shader_identifier(RayTracingShaderKind::Miss, 0));
    for record in 0..8 {
        table.set_hit_group_identifier(
            record,
            pipeline.shader_identifier(RayTracingShaderKind::HitGroup, 0),
        );
        table.set_local_shader_parameters(record, 0, &record.to_le_bytes());
    }
    table.upload(f.device.as_ref()).unwrap();
    assert!(table.buffer().is_some());

    let regions = table.dispatch_regions(0, 0, true);
    assert_eq!(regions.hit_group.stride, u64::from(table.local_record_stride()));
    assert_eq!(
        regions.hit_group.size,
        8 * u64::from(table.local_record_stride())
    );

    descriptor_cache.update_sync_point(f.ctx.fence());
    descriptor_cache.release(f.ctx.descriptor_heaps());
}

#[test]
fn tables_without_local_data_need_no_descriptor_cache() {
    let f = fixture();
    let desc = ShaderBindingTableDesc {
        num_ray_gen_records: 1,
        num_miss_records: 2,
        ..ShaderBindingTableDesc::default()
    };
    let (table, descriptor_cache) = f.ctx.create_shader_table(&desc).unwrap();
    assert!(descriptor_cache.is_none());
    assert_eq!(table.size_bytes() as u32 % TABLE_BYTE_ALIGNMENT, 0);
}

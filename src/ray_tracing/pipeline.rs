//! Full ray-tracing pipeline assembly.
//!
//! A full pipeline links precompiled collections instead of recompiling
//! shaders: the assembler resolves one collection per distinct shader
//! through the [`CollectionCache`], builds the required subobject set
//! (shader config, export associations, recursion config, binding layouts,
//! collection references) and hands it to the device in one call. Shader
//! identifiers are then queried per export and baked into a default
//! shader-binding table.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::binding::RootSignature;
use crate::device::{Device, DeviceObject, DeviceObjectId};
use crate::error::Result;
use crate::pipeline::key::ShaderBytecode;
use crate::ray_tracing::collection::{CollectionCache, ShaderCollection};
use crate::ray_tracing::shader::{RayTracingShader, RayTracingShaderKind, ShaderIdentifier};
use crate::ray_tracing::shader_table::{ShaderBindingTable, ShaderBindingTableDesc};

/// Attribute block size reserved for hit attributes (two barycentrics).
pub const MAX_ATTRIBUTE_SIZE: u32 = 8;

/// Rays are only traced from the ray-generation stage; recursion is
/// disallowed and every pipeline config pins depth 1.
pub const RECURSION_DEPTH: u32 = 1;

// ─── State-object descriptions ───────────────────────────────────────────────

/// Whether a state object is a partial collection or a linked full pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateObjectKind {
    Collection,
    Pipeline,
}

/// Renames one library entry point to its collision-free export name.
#[derive(Debug, Clone, Copy)]
pub struct ExportRename<'a> {
    pub original: &'a str,
    pub renamed: &'a str,
}

/// One shader library included in a state object.
#[derive(Debug, Clone, Copy)]
pub struct ShaderLibraryDesc<'a> {
    pub bytecode: &'a ShaderBytecode,
    pub renames: &'a [ExportRename<'a>],
}

/// Geometry class a hit group intersects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitGroupGeometry {
    Triangles,
    Procedural,
}

/// A hit-group subobject: up to three entry points under one group name.
#[derive(Debug, Clone, Copy)]
pub struct HitGroupDesc<'a> {
    pub name: &'a str,
    pub geometry: HitGroupGeometry,
    pub closest_hit: &'a str,
    pub any_hit: Option<&'a str>,
    pub intersection: Option<&'a str>,
}

/// Reference to a precompiled collection being linked into a full pipeline.
#[derive(Debug, Clone, Copy)]
pub struct CollectionRef<'a> {
    pub state_object: DeviceObjectId,
    pub exports: &'a [&'a str],
}

/// Complete subobject set for one ray-tracing state object.
///
/// The shader config (payload/attribute sizes) associates with `exports`;
/// `local_layout_associations` indexes into `local_layouts` per export, with
/// an empty slice meaning every export uses layout 0.
#[derive(Debug, Clone, Copy)]
pub struct StateObjectDesc<'a> {
    pub shader_libraries: &'a [ShaderLibraryDesc<'a>],
    pub exports: &'a [&'a str],
    pub max_payload_size: u32,
    pub max_attribute_size: u32,
    pub recursion_depth: u32,
    pub hit_groups: &'a [HitGroupDesc<'a>],
    pub global_layout: DeviceObjectId,
    pub local_layouts: &'a [DeviceObjectId],
    pub local_layout_associations: &'a [u32],
    pub collections: &'a [CollectionRef<'a>],
}

// ─── Pipeline description ────────────────────────────────────────────────────

/// Shaders and limits for one full ray-tracing pipeline.
#[derive(Clone, Default)]
pub struct RayTracingPipelineDesc {
    pub ray_gen: Vec<Arc<RayTracingShader>>,
    pub miss: Vec<Arc<RayTracingShader>>,
    pub hit_groups: Vec<Arc<RayTracingShader>>,
    pub callable: Vec<Arc<RayTracingShader>>,
    pub max_payload_size: u32,
    pub allow_hit_group_indexing: bool,
}

/// Shaders of one kind with their post-link identifiers, index-aligned.
#[derive(Default)]
pub struct RayTracingShaderSet {
    shaders: Vec<Arc<RayTracingShader>>,
    identifiers: Vec<ShaderIdentifier>,
}

impl RayTracingShaderSet {
    #[must_use]
    pub fn shaders(&self) -> &[Arc<RayTracingShader>] {
        &self.shaders
    }

    #[must_use]
    pub fn identifiers(&self) -> &[ShaderIdentifier] {
        &self.identifiers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}

// ─── Assembled pipeline ──────────────────────────────────────────────────────

/// A linked full ray-tracing pipeline and its default shader-binding table.
pub struct RayTracingPipeline {
    state_object: DeviceObject,
    global_layout: DeviceObjectId,
    ray_gen: RayTracingShaderSet,
    miss: RayTracingShaderSet,
    hit_groups: RayTracingShaderSet,
    callable: RayTracingShaderSet,
    max_hit_view_descriptors: u32,
    max_local_root_data_size: u32,
    allow_hit_group_indexing: bool,
    default_table: ShaderBindingTable,
}

impl RayTracingPipeline {
    /// Links a full pipeline from cached collections.
    ///
    /// All ray-generation and miss shaders must share one global binding
    /// layout; it becomes the pipeline's global layout. Collections are
    /// resolved (compiling on first sight) and de-duplicated before linking,
    /// so a shader appearing in several slots contributes one collection.
    pub fn assemble(
        device: &dyn Device,
        collections: &CollectionCache,
        desc: &RayTracingPipelineDesc,
    ) -> Result<Self> {
        assert!(
            !desc.ray_gen.is_empty(),
            "a ray-tracing pipeline needs at least one ray-generation shader"
        );

        let global_signature: &Arc<RootSignature> = desc.ray_gen[0].root_signature();
        let global_layout = global_signature.id();
        for shader in desc.ray_gen.iter().chain(&desc.miss) {
            assert!(
                Arc::ptr_eq(shader.root_signature(), global_signature),
                "all ray-generation and miss shaders must share one global binding layout"
            );
        }

        // Resolve one collection per shader, de-duplicated by identity.
        let mut seen: FxHashSet<usize> = FxHashSet::default();
        let mut unique: Vec<Arc<ShaderCollection>> = Vec::new();
        let mut exports: Vec<SmallVec<[String; 1]>> = Vec::with_capacity(4);

        let mut resolve = |shaders: &[Arc<RayTracingShader>]| -> Result<SmallVec<[String; 1]>> {
            let mut names = SmallVec::with_capacity(shaders.len());
            for shader in shaders {
                let collection =
                    collections.get_or_compile(shader, global_layout, desc.max_payload_size)?;
                names.push(collection.primary_export().to_owned());
                if seen.insert(Arc::as_ptr(&collection) as usize) {
                    unique.push(collection);
                }
            }
            Ok(names)
        };

        exports.push(resolve(&desc.ray_gen)?);
        exports.push(resolve(&desc.miss)?);
        exports.push(resolve(&desc.hit_groups)?);
        exports.push(resolve(&desc.callable)?);

        // Record-local limits drive shader-table sizing later.
        let mut max_hit_view_descriptors = 0u32;
        let mut max_local_root_data_size = 0u32;
        for shader in desc.hit_groups.iter().chain(&desc.callable) {
            max_hit_view_descriptors = max_hit_view_descriptors.max(shader.view_descriptor_count());
            max_local_root_data_size =
                max_local_root_data_size.max(shader.root_signature().size_bytes());
        }

        let state_object = {
            let export_lists: Vec<SmallVec<[&str; 4]>> = unique
                .iter()
                .map(|c| c.exports().iter().map(String::as_str).collect())
                .collect();
            let collection_refs: Vec<CollectionRef<'_>> = unique
                .iter()
                .zip(&export_lists)
                .map(|(collection, exports)| CollectionRef {
                    state_object: collection.state_object(),
                    exports,
                })
                .collect();

            let link_desc = StateObjectDesc {
                shader_libraries: &[],
                exports: &[],
                max_payload_size: desc.max_payload_size,
                max_attribute_size: MAX_ATTRIBUTE_SIZE,
                recursion_depth: RECURSION_DEPTH,
                hit_groups: &[],
                global_layout,
                local_layouts: &[],
                local_layout_associations: &[],
                collections: &collection_refs,
            };
            device
                .create_ray_tracing_state_object(&link_desc, StateObjectKind::Pipeline)
                .map_err(|err| {
                    log::error!(
                        "ray-tracing pipeline link failed ({} collections): {err}",
                        collection_refs.len()
                    );
                    err
                })?
        };

        // Query identifiers per export, in slot order.
        let mut sets = exports.into_iter();
        let mut build_set = |shaders: &[Arc<RayTracingShader>]| -> Result<RayTracingShaderSet> {
            let names = sets.next().unwrap_or_default();
            let mut identifiers = Vec::with_capacity(names.len());
            for name in &names {
                identifiers.push(device.shader_identifier(state_object.id(), name)?);
            }
            Ok(RayTracingShaderSet {
                shaders: shaders.to_vec(),
                identifiers,
            })
        };
        let ray_gen = build_set(&desc.ray_gen)?;
        let miss = build_set(&desc.miss)?;
        let hit_groups = build_set(&desc.hit_groups)?;
        let callable = build_set(&desc.callable)?;

        // Default table: every ray-gen and miss shader plus one hit-group
        // identifier, record-local data and hit indexing disabled.
        let mut default_table = ShaderBindingTable::new(&ShaderBindingTableDesc {
            num_ray_gen_records: ray_gen.len() as u32,
            num_miss_records: miss.len() as u32,
            num_hit_records: 0,
            num_callable_records: 0,
            local_root_data_size: 0,
            max_view_descriptors_per_record: 0,
        });
        default_table.set_ray_gen_identifiers(ray_gen.identifiers());
        default_table.set_miss_identifiers(miss.identifiers());
        default_table.set_default_hit_group_identifier(
            hit_groups
                .identifiers()
                .first()
                .copied()
                .unwrap_or(ShaderIdentifier::NULL),
        );

        log::debug!(
            "assembled ray-tracing pipeline: {} raygen, {} miss, {} hit, {} callable, {} collections",
            ray_gen.len(),
            miss.len(),
            hit_groups.len(),
            callable.len(),
            unique.len()
        );

        Ok(Self {
            state_object,
            global_layout,
            ray_gen,
            miss,
            hit_groups,
            callable,
            max_hit_view_descriptors,
            max_local_root_data_size,
            allow_hit_group_indexing: desc.allow_hit_group_indexing && !desc.hit_groups.is_empty(),
            default_table,
        })
    }

    /// Observer id of the linked state object.
    #[must_use]
    pub fn state_object(&self) -> DeviceObjectId {
        self.state_object.id()
    }

    /// The global binding layout every shader in this pipeline binds
    /// against.
    #[must_use]
    pub fn global_layout(&self) -> DeviceObjectId {
        self.global_layout
    }

    #[must_use]
    pub fn ray_gen(&self) -> &RayTracingShaderSet {
        &self.ray_gen
    }

    #[must_use]
    pub fn miss(&self) -> &RayTracingShaderSet {
        &self.miss
    }

    #[must_use]
    pub fn hit_groups(&self) -> &RayTracingShaderSet {
        &self.hit_groups
    }

    #[must_use]
    pub fn callable(&self) -> &RayTracingShaderSet {
        &self.callable
    }

    /// Identifier for one shader slot.
    #[must_use]
    pub fn shader_identifier(&self, kind: RayTracingShaderKind, index: usize) -> ShaderIdentifier {
        let set = match kind {
            RayTracingShaderKind::RayGen => &self.ray_gen,
            RayTracingShaderKind::Miss => &self.miss,
            RayTracingShaderKind::HitGroup => &self.hit_groups,
            RayTracingShaderKind::Callable => &self.callable,
        };
        set.identifiers()[index]
    }

    /// Largest view-descriptor footprint of any hit or callable record.
    #[must_use]
    pub fn max_hit_view_descriptors(&self) -> u32 {
        self.max_hit_view_descriptors
    }

    /// Largest record-local data block any hit or callable shader binds.
    #[must_use]
    pub fn max_local_root_data_size(&self) -> u32 {
        self.max_local_root_data_size
    }

    /// Whether dispatches may index hit-group records.
    #[must_use]
    pub fn allow_hit_group_indexing(&self) -> bool {
        self.allow_hit_group_indexing
    }

    /// The prebuilt table for dispatches that bind no record-local
    /// resources.
    #[must_use]
    pub fn default_table(&self) -> &ShaderBindingTable {
        &self.default_table
    }

    /// Mutable access for uploading the default table.
    #[must_use]
    pub fn default_table_mut(&mut self) -> &mut ShaderBindingTable {
        &mut self.default_table
    }
}

impl std::fmt::Debug for RayTracingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayTracingPipeline")
            .field("ray_gen", &self.ray_gen.len())
            .field("miss", &self.miss.len())
            .field("hit_groups", &self.hit_groups.len())
            .field("callable", &self.callable.len())
            .field("hit_group_indexing", &self.allow_hit_group_indexing)
            .finish()
    }
}

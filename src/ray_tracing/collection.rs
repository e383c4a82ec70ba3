//! The ray-tracing shader-collection cache.
//!
//! Each shader compiles in isolation into a *collection* — a partial
//! pipeline object exporting one renamed entry point per logical shader (a
//! hit group exports up to three). Collections are cached by
//! (shader identity, global layout, local layout, max payload size), so a
//! shader reused across many pipeline configurations with the same payload
//! and layouts compiles exactly once. There is no eviction: collections live
//! for the device's lifetime, trading memory for guaranteed hits on
//! re-link.
//!
//! Export names embed the shader's content hash, which keeps them
//! collision-free across independently compiled collections without any
//! global name registry.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::binding::BindingSpace;
use crate::device::{Device, DeviceObject, DeviceObjectId};
use crate::error::Result;
use crate::ray_tracing::pipeline::{
    ExportRename, HitGroupDesc, HitGroupGeometry, ShaderLibraryDesc, StateObjectDesc,
    StateObjectKind, MAX_ATTRIBUTE_SIZE, RECURSION_DEPTH,
};
use crate::ray_tracing::shader::{RayTracingShader, RayTracingShaderKind};

fn export_name(prefix: &str, content_hash: u64) -> String {
    format!("{prefix}_{content_hash:016x}")
}

// ─── Cached collection ───────────────────────────────────────────────────────

/// A compiled single-shader sub-pipeline, reusable by every full pipeline
/// that links it.
pub struct ShaderCollection {
    shader: Arc<RayTracingShader>,
    state_object: DeviceObject,
    /// Export names, primary first. For hit groups the primary is the hit
    /// group itself, followed by its renamed entry points.
    exports: SmallVec<[String; 4]>,
}

impl ShaderCollection {
    /// The export a shader-table record refers to.
    #[must_use]
    pub fn primary_export(&self) -> &str {
        &self.exports[0]
    }

    /// Every export this collection contributes to a linked pipeline.
    #[must_use]
    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    /// Observer id of the collection state object.
    #[must_use]
    pub fn state_object(&self) -> DeviceObjectId {
        self.state_object.id()
    }

    /// The shader this collection was compiled from.
    #[must_use]
    pub fn shader(&self) -> &Arc<RayTracingShader> {
        &self.shader
    }
}

impl std::fmt::Debug for ShaderCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCollection")
            .field("primary_export", &self.primary_export())
            .field("exports", &self.exports.len())
            .finish()
    }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CollectionKey {
    shader_hash: u64,
    global_layout: DeviceObjectId,
    local_layout: DeviceObjectId,
    max_payload_size: u32,
}

/// Cache of compiled shader collections.
pub struct CollectionCache {
    device: Arc<dyn Device>,
    map: Mutex<FxHashMap<CollectionKey, Arc<ShaderCollection>>>,
    /// Empty local layout shared by every shader that binds no local
    /// resources (ray-generation and miss shaders).
    default_local_layout: DeviceObject,
}

impl CollectionCache {
    /// Creates the cache, compiling the shared empty local layout.
    pub fn new(device: Arc<dyn Device>) -> Result<Self> {
        let default_local_layout =
            device.create_binding_layout_object(&[], BindingSpace::RayTracingLocal)?;
        Ok(Self {
            device,
            map: Mutex::new(FxHashMap::default()),
            default_local_layout,
        })
    }

    /// Resolves the collection for `shader`, compiling it on first sight.
    ///
    /// Compilation happens under the cache mutex; collections compile once
    /// per distinct key and the serialization keeps the absent → present
    /// transition atomic for every observer.
    pub fn get_or_compile(
        &self,
        shader: &Arc<RayTracingShader>,
        global_layout: DeviceObjectId,
        max_payload_size: u32,
    ) -> Result<Arc<ShaderCollection>> {
        let local_layout = match shader.kind() {
            RayTracingShaderKind::HitGroup | RayTracingShaderKind::Callable => {
                shader.root_signature().id()
            }
            RayTracingShaderKind::RayGen | RayTracingShaderKind::Miss => {
                self.default_local_layout.id()
            }
        };

        let key = CollectionKey {
            shader_hash: shader.content_hash(),
            global_layout,
            local_layout,
            max_payload_size,
        };

        let mut map = self.map.lock();
        if let Some(existing) = map.get(&key) {
            return Ok(existing.clone());
        }

        let collection = self
            .compile(shader, global_layout, local_layout, max_payload_size)
            .map_err(|err| {
                log::error!(
                    "collection compilation failed ({:?} {:#018x}): {err}",
                    shader.kind(),
                    shader.content_hash()
                );
                err
            })?;
        log::debug!(
            "compiled {:?} collection {} ({} exports)",
            shader.kind(),
            collection.primary_export(),
            collection.exports.len()
        );

        let shared = Arc::new(collection);
        map.insert(key, shared.clone());
        Ok(shared)
    }

    fn compile(
        &self,
        shader: &Arc<RayTracingShader>,
        global_layout: DeviceObjectId,
        local_layout: DeviceObjectId,
        max_payload_size: u32,
    ) -> Result<ShaderCollection> {
        let hash = shader.content_hash();
        let is_hit_group = shader.kind() == RayTracingShaderKind::HitGroup;

        // Exports, primary first. Original entry points line up with
        // `exports[renamed_from..]` pairwise.
        let mut exports: SmallVec<[String; 4]> = SmallVec::new();
        exports.push(export_name(shader.kind().export_prefix(), hash));
        let mut originals: SmallVec<[&str; 3]> = SmallVec::new();
        if is_hit_group {
            exports.push(export_name("CHS", hash));
            originals.push(shader.entry_point());
            if let Some(entry) = shader.any_hit_entry_point() {
                exports.push(export_name("AHS", hash));
                originals.push(entry);
            }
            if let Some(entry) = shader.intersection_entry_point() {
                exports.push(export_name("IS", hash));
                originals.push(entry);
            }
        } else {
            originals.push(shader.entry_point());
        }
        let renamed_from = usize::from(is_hit_group);

        let state_object = {
            let renames: SmallVec<[ExportRename<'_>; 3]> = originals
                .iter()
                .zip(&exports[renamed_from..])
                .map(|(&original, renamed)| ExportRename {
                    original,
                    renamed: renamed.as_str(),
                })
                .collect();
            // The shader-config association covers the renamed entry points,
            // not the hit-group name.
            let associated: SmallVec<[&str; 3]> = exports[renamed_from..]
                .iter()
                .map(String::as_str)
                .collect();

            let hit_groups: SmallVec<[HitGroupDesc<'_>; 1]> = if is_hit_group {
                let mut next = 2;
                let any_hit = shader.any_hit_entry_point().map(|_| {
                    let name = exports[next].as_str();
                    next += 1;
                    name
                });
                let intersection = shader
                    .intersection_entry_point()
                    .map(|_| exports[next].as_str());
                let mut groups = SmallVec::new();
                groups.push(HitGroupDesc {
                    name: &exports[0],
                    geometry: if intersection.is_some() {
                        HitGroupGeometry::Procedural
                    } else {
                        HitGroupGeometry::Triangles
                    },
                    closest_hit: &exports[1],
                    any_hit,
                    intersection,
                });
                groups
            } else {
                SmallVec::new()
            };

            let library = ShaderLibraryDesc {
                bytecode: shader.bytecode(),
                renames: &renames,
            };
            let local_layouts = [local_layout];

            let desc = StateObjectDesc {
                shader_libraries: std::slice::from_ref(&library),
                exports: &associated,
                max_payload_size,
                max_attribute_size: MAX_ATTRIBUTE_SIZE,
                recursion_depth: RECURSION_DEPTH,
                hit_groups: &hit_groups,
                global_layout,
                local_layouts: &local_layouts,
                local_layout_associations: &[],
                collections: &[],
            };

            self.device
                .create_ray_tracing_state_object(&desc, StateObjectKind::Collection)?
        };

        Ok(ShaderCollection {
            shader: shader.clone(),
            state_object,
            exports,
        })
    }

    /// Number of cached collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// Whether no collection has been compiled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CollectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionCache")
            .field("collections", &self.len())
            .finish()
    }
}

//! Ray-tracing shader descriptions and shader identifiers.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::binding::{BindingSpace, ResourceCounts, RootSignature};
use crate::pipeline::key::ShaderBytecode;

/// Size of an opaque shader identifier in a shader-table record.
pub const SHADER_IDENTIFIER_SIZE: usize = 32;

/// Opaque identifier of a shader export inside a linked pipeline.
///
/// All-ones marks an identifier that was never assigned; all-zeros is the
/// *null* identifier — a record carrying it executes no shader, which is a
/// legal way to skip a hit group.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ShaderIdentifier {
    data: [u64; 4],
}

impl Default for ShaderIdentifier {
    fn default() -> Self {
        Self::INVALID
    }
}

impl ShaderIdentifier {
    /// Never-assigned marker.
    pub const INVALID: Self = Self { data: [!0u64; 4] };
    /// Executes no shader when dispatched.
    pub const NULL: Self = Self { data: [0u64; 4] };

    /// Builds an identifier from the bytes the device returned.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; SHADER_IDENTIFIER_SIZE]) -> Self {
        let mut data = [0u64; 4];
        bytemuck::bytes_of_mut(&mut data).copy_from_slice(bytes);
        Self { data }
    }

    /// Raw record bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.data)
    }

    /// Whether this identifier was assigned by a pipeline.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Whether this is the null (no-shader) identifier.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// The four logical ray-tracing shader kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RayTracingShaderKind {
    RayGen,
    Miss,
    HitGroup,
    Callable,
}

impl RayTracingShaderKind {
    /// Prefix used when generating collision-free export names.
    #[must_use]
    pub fn export_prefix(self) -> &'static str {
        match self {
            Self::RayGen => "RayGen",
            Self::Miss => "Miss",
            Self::HitGroup => "HitGroup",
            Self::Callable => "Callable",
        }
    }
}

/// One ray-tracing shader as handed to the collection cache.
///
/// For ray-generation and miss shaders `root_signature` is the *global*
/// binding layout of the dispatch; for hit groups and callables it is the
/// *local* layout their records bind through.
#[derive(Clone)]
pub struct RayTracingShader {
    kind: RayTracingShaderKind,
    bytecode: ShaderBytecode,
    entry_point: String,
    any_hit_entry_point: Option<String>,
    intersection_entry_point: Option<String>,
    resource_counts: ResourceCounts,
    root_signature: Arc<RootSignature>,
}

impl RayTracingShader {
    /// Describes a shader with a single entry point.
    #[must_use]
    pub fn new(
        kind: RayTracingShaderKind,
        bytecode: ShaderBytecode,
        entry_point: impl Into<String>,
        resource_counts: ResourceCounts,
        root_signature: Arc<RootSignature>,
    ) -> Self {
        let expected_space = match kind {
            RayTracingShaderKind::RayGen | RayTracingShaderKind::Miss => {
                BindingSpace::RayTracingGlobal
            }
            RayTracingShaderKind::HitGroup | RayTracingShaderKind::Callable => {
                BindingSpace::RayTracingLocal
            }
        };
        assert_eq!(
            root_signature.layout().space,
            expected_space,
            "{kind:?} shader bound to a layout in the wrong binding space"
        );

        Self {
            kind,
            bytecode,
            entry_point: entry_point.into(),
            any_hit_entry_point: None,
            intersection_entry_point: None,
            resource_counts,
            root_signature,
        }
    }

    /// Adds an any-hit entry point (hit groups only).
    #[must_use]
    pub fn with_any_hit(mut self, entry_point: impl Into<String>) -> Self {
        assert_eq!(self.kind, RayTracingShaderKind::HitGroup);
        self.any_hit_entry_point = Some(entry_point.into());
        self
    }

    /// Adds an intersection entry point, making the hit group procedural.
    #[must_use]
    pub fn with_intersection(mut self, entry_point: impl Into<String>) -> Self {
        assert_eq!(self.kind, RayTracingShaderKind::HitGroup);
        self.intersection_entry_point = Some(entry_point.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> RayTracingShaderKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn bytecode(&self) -> &ShaderBytecode {
        &self.bytecode
    }

    /// Stable identity of the shader: the bytecode content hash.
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        self.bytecode.hash()
    }

    #[inline]
    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    #[inline]
    #[must_use]
    pub fn any_hit_entry_point(&self) -> Option<&str> {
        self.any_hit_entry_point.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn intersection_entry_point(&self) -> Option<&str> {
        self.intersection_entry_point.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn resource_counts(&self) -> &ResourceCounts {
        &self.resource_counts
    }

    /// View descriptors one record of this shader can reference.
    #[must_use]
    pub fn view_descriptor_count(&self) -> u32 {
        self.resource_counts.views + self.resource_counts.rw_views
    }

    #[inline]
    #[must_use]
    pub fn root_signature(&self) -> &Arc<RootSignature> {
        &self.root_signature
    }
}

impl std::fmt::Debug for RayTracingShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayTracingShader")
            .field("kind", &self.kind)
            .field("entry_point", &self.entry_point)
            .field("content_hash", &format_args!("{:#018x}", self.content_hash()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_markers_are_distinct() {
        assert!(!ShaderIdentifier::INVALID.is_null());
        assert!(!ShaderIdentifier::NULL.is_valid());
        assert!(ShaderIdentifier::NULL.is_null());
        assert_eq!(ShaderIdentifier::default(), ShaderIdentifier::INVALID);
    }

    #[test]
    fn identifier_round_trips_through_bytes() {
        let mut bytes = [0u8; SHADER_IDENTIFIER_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let id = ShaderIdentifier::from_bytes(&bytes);
        assert!(id.is_valid());
        assert_eq!(id.as_bytes(), &bytes);
    }
}

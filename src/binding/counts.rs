//! Per-stage resource-usage counts and the binding capability tiers.

/// Shader stages that can own binding slots. `All` covers compute and
/// ray-tracing work, which bind with all-stage visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ShaderStage {
    Vertex = 0,
    Hull = 1,
    Domain = 2,
    Geometry = 3,
    Pixel = 4,
    All = 5,
}

/// Number of [`ShaderStage`] values.
pub const STAGE_COUNT: usize = 6;

/// Stage order used when emitting binding slots. Pixel-stage parameters come
/// first so the most frequently rebound tables get the cheapest slots.
pub const STAGE_SLOT_PRIORITY: [ShaderStage; STAGE_COUNT] = [
    ShaderStage::Pixel,
    ShaderStage::Vertex,
    ShaderStage::Geometry,
    ShaderStage::Hull,
    ShaderStage::Domain,
    ShaderStage::All,
];

/// Resource counts one shader stage declares, from reflection.
///
/// Derived once per shader at compile time; immutable afterwards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceCounts {
    /// Read-only resource views.
    pub views: u32,
    /// Read-write (unordered-access) views.
    pub rw_views: u32,
    /// Constant buffers.
    pub constant_buffers: u32,
    /// Samplers.
    pub samplers: u32,
}

impl ResourceCounts {
    /// Whether the stage declares no resources at all.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views == 0 && self.rw_views == 0 && self.constant_buffers == 0 && self.samplers == 0
    }
}

// Per-stage caps. Lower numbers produce smaller binding layouts; titles with
// unusually deep material stacks may need to raise `MAX_VIEWS`.
/// Maximum read-only views per stage.
pub const MAX_VIEWS: u32 = 48;
/// Maximum read-write views per stage.
pub const MAX_RW_VIEWS: u32 = 16;
/// Maximum constant buffers per stage.
pub const MAX_CONSTANT_BUFFERS: u32 = 16;
/// Maximum samplers per stage.
pub const MAX_SAMPLERS: u32 = 16;

/// Constant buffers up to this count get individually-addressed slots; any
/// excess is promoted into a shared descriptor-table range. Each
/// individually-addressed slot costs 2 DWORDs of the 64-DWORD layout budget.
pub const MAX_ROOT_CONSTANT_BUFFERS: u32 = 8;

/// Hardware binding capability class.
///
/// Coarser tiers restrict how finely descriptors can be rebound, so layouts
/// built for them quantize resource counts aggressively to keep the number
/// of distinct compiled layouts small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingTier {
    /// Coarsest class: view and sampler counts quantize to powers of two.
    One,
    /// Views and samplers bind exactly; read-write views and promoted
    /// constant-buffer ranges still quantize.
    Two,
    /// All counts bind exactly, clamped to the per-stage caps.
    Three,
}

/// Which binding space a compiled layout lives in.
///
/// Ray-tracing pipelines split bindings between a global space (shared by
/// every shader in a dispatch) and a per-record local space.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSpace {
    /// Ordinary graphics/compute binding space.
    #[default]
    Raster,
    /// Ray-tracing global bindings, set once per dispatch.
    RayTracingGlobal,
    /// Ray-tracing local bindings, sourced from shader-table records.
    RayTracingLocal,
}

//! Fixed-Function Pipeline State
//!
//! Hashable descriptions of the non-shader pipeline state that participates
//! in pipeline-state identity: blend, rasterizer, depth/stencil, topology,
//! attachment formats and multisampling.
//!
//! All types derive `Hash`/`Eq` directly; floating-point fields are stored
//! as raw bits (`u32`) so derived equality is exact and hashing never sees a
//! `f32`. Enums carry explicit `u8` discriminants — the pipeline key packs
//! them into a fixed-layout aggregate for content hashing.

use bitflags::bitflags;

// ─── Formats & topology ──────────────────────────────────────────────────────

/// Attachment formats understood by the backend.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Format {
    /// No attachment bound.
    #[default]
    Unknown = 0,
    Rgba8Unorm = 1,
    Rgba8UnormSrgb = 2,
    Bgra8Unorm = 3,
    Rgb10A2Unorm = 4,
    Rg11B10Float = 5,
    Rgba16Float = 6,
    Rgba32Float = 7,
    R32Uint = 8,
    R32Float = 9,
    Depth32Float = 10,
    Depth24Stencil8 = 11,
}

/// Primitive topology class baked into a graphics pipeline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveTopology {
    PointList = 0,
    LineList = 1,
    #[default]
    TriangleList = 2,
    TriangleStrip = 3,
    PatchList = 4,
}

bitflags! {
    /// Per-channel color write mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u8 {
        const RED   = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE  = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL   = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWrites {
    fn default() -> Self {
        Self::ALL
    }
}

bitflags! {
    /// Pipeline-creation flags forwarded to the device.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineFlags: u8 {
        /// Request an unoptimized pipeline for tooling/debug captures.
        const TOOL_DEBUG = 1 << 0;
    }
}

// ─── Blend ───────────────────────────────────────────────────────────────────

/// Blend factor for one operand.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendFactor {
    Zero = 0,
    #[default]
    One = 1,
    SrcColor = 2,
    InvSrcColor = 3,
    SrcAlpha = 4,
    InvSrcAlpha = 5,
    DstColor = 6,
    InvDstColor = 7,
    DstAlpha = 8,
    InvDstAlpha = 9,
}

/// Blend equation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendOp {
    #[default]
    Add = 0,
    Subtract = 1,
    ReverseSubtract = 2,
    Min = 3,
    Max = 4,
}

/// One blend component (color or alpha).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOp,
}

/// Blend state of a single render target.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// `None` disables blending for the target.
    pub blend: Option<BlendPair>,
    pub write_mask: ColorWrites,
}

/// The color/alpha blend pair used when blending is enabled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendPair {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

/// One render-target attachment slot: format plus its blend state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetState {
    pub format: Format,
    pub blend: BlendState,
}

/// Maximum simultaneously bound render targets.
pub const MAX_RENDER_TARGETS: usize = 8;

// ─── Rasterizer ──────────────────────────────────────────────────────────────

/// Triangle fill mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FillMode {
    #[default]
    Solid = 0,
    Wireframe = 1,
}

/// Face culling mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CullMode {
    None = 0,
    Front = 1,
    #[default]
    Back = 2,
}

/// Rasterizer state. Bias floats are stored as raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp_bits: u32,
    pub slope_scaled_depth_bias_bits: u32,
    pub depth_clip: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp_bits: 0,
            slope_scaled_depth_bias_bits: 0,
            depth_clip: true,
        }
    }
}

impl RasterizerState {
    /// Sets the slope-scaled and clamped depth bias from float values.
    #[must_use]
    pub fn with_depth_bias(mut self, constant: i32, slope_scale: f32, clamp: f32) -> Self {
        self.depth_bias = constant;
        self.slope_scaled_depth_bias_bits = slope_scale.to_bits();
        self.depth_bias_clamp_bits = clamp.to_bits();
        self
    }
}

// ─── Depth / stencil ─────────────────────────────────────────────────────────

/// Comparison function for depth and stencil tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompareFunc {
    Never = 0,
    Less = 1,
    Equal = 2,
    LessEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterEqual = 6,
    #[default]
    Always = 7,
}

/// Stencil operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StencilOp {
    #[default]
    Keep = 0,
    Zero = 1,
    Replace = 2,
    IncrementClamp = 3,
    DecrementClamp = 4,
    Invert = 5,
    IncrementWrap = 6,
    DecrementWrap = 7,
}

/// Per-face stencil behavior.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub compare: CompareFunc,
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
}

/// Depth/stencil state. The depth attachment format lives in the pipeline
/// key next to the render-target formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write: true,
            depth_compare: CompareFunc::LessEqual,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front: StencilFaceState::default(),
            back: StencilFaceState::default(),
        }
    }
}

// ─── Multisampling ───────────────────────────────────────────────────────────

/// Multisample state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleState {
    pub count: u32,
    pub mask: u32,
    pub alpha_to_coverage: bool,
}

impl Default for SampleState {
    fn default() -> Self {
        Self {
            count: 1,
            mask: !0,
            alpha_to_coverage: false,
        }
    }
}

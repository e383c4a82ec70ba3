//! Pipeline-state keys and combined hashing.
//!
//! A pipeline key aggregates the binding-layout identity, per-stage shader
//! *content hashes* and all fixed-function state. The combined hash is
//! computed once over a fixed-layout `#[repr(C)]` aggregate built from those
//! fields — never over the human-readable description — so hashing cost is
//! proportional to state size, not bytecode size.
//!
//! Zero is the reserved "unset" sentinel for combined hashes; the computed
//! value is remapped away from it.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use xxhash_rust::xxh3::xxh3_64;

use crate::device::DeviceObjectId;
use crate::state::{
    DepthStencilState, Format, PipelineFlags, PrimitiveTopology, RasterizerState,
    RenderTargetState, SampleState, MAX_RENDER_TARGETS,
};

// ─── Shader bytecode ─────────────────────────────────────────────────────────

/// Compiled shader bytecode plus its 64-bit content hash.
///
/// The hash is computed once at construction; pipeline keys embed the hash,
/// not the bytes.
#[derive(Debug, Clone)]
pub struct ShaderBytecode {
    bytes: Arc<[u8]>,
    hash: u64,
}

impl ShaderBytecode {
    /// Wraps compiled bytecode, hashing its contents.
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let hash = xxh3_64(&bytes);
        Self { bytes, hash }
    }

    /// Content hash of the bytecode.
    #[inline]
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The raw bytecode.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// ─── Descriptions ────────────────────────────────────────────────────────────

/// Immutable description of a graphics pipeline.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    /// Identity of the compiled binding layout the pipeline binds against.
    pub root_signature: DeviceObjectId,
    pub vertex: ShaderBytecode,
    pub hull: Option<ShaderBytecode>,
    pub domain: Option<ShaderBytecode>,
    pub geometry: Option<ShaderBytecode>,
    pub pixel: Option<ShaderBytecode>,
    /// Identity hash of the vertex input layout.
    pub input_layout_hash: u64,
    pub topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub sample: SampleState,
    pub flags: PipelineFlags,
    pub render_targets: [RenderTargetState; MAX_RENDER_TARGETS],
    pub num_render_targets: u32,
    pub depth_format: Format,
}

/// Immutable description of a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDesc {
    /// Identity of the compiled binding layout the pipeline binds against.
    pub root_signature: DeviceObjectId,
    pub shader: ShaderBytecode,
    pub flags: PipelineFlags,
}

/// Borrowed view of either pipeline description, handed to the device.
#[derive(Debug, Clone, Copy)]
pub enum PipelineStateDesc<'a> {
    Graphics(&'a GraphicsPipelineDesc),
    Compute(&'a ComputePipelineDesc),
}

// ─── Fixed-layout hash aggregates ────────────────────────────────────────────

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GraphicsKeyData {
    shader_hashes: [u64; 5],
    root_signature: u64,
    input_layout_hash: u64,

    fill_mode: u32,
    cull_mode: u32,
    front_counter_clockwise: u32,
    depth_bias: i32,
    depth_bias_clamp_bits: u32,
    slope_scaled_depth_bias_bits: u32,
    depth_clip: u32,

    depth_enable: u32,
    depth_write: u32,
    depth_compare: u32,
    stencil_enable: u32,
    stencil_read_mask: u32,
    stencil_write_mask: u32,
    front_compare: u32,
    front_fail_op: u32,
    front_depth_fail_op: u32,
    front_pass_op: u32,
    back_compare: u32,
    back_fail_op: u32,
    back_depth_fail_op: u32,
    back_pass_op: u32,

    topology: u32,
    depth_format: u32,
    sample_count: u32,
    sample_mask: u32,
    alpha_to_coverage: u32,
    flags: u32,
    num_render_targets: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RenderTargetKeyData {
    format: u32,
    blend_enable: u32,
    src_factor: u32,
    dst_factor: u32,
    operation: u32,
    alpha_src_factor: u32,
    alpha_dst_factor: u32,
    alpha_operation: u32,
    write_mask: u32,
}

impl From<&RenderTargetState> for RenderTargetKeyData {
    fn from(rt: &RenderTargetState) -> Self {
        let pair = rt.blend.blend.unwrap_or_default();
        Self {
            format: rt.format as u32,
            blend_enable: u32::from(rt.blend.blend.is_some()),
            src_factor: pair.color.src_factor as u32,
            dst_factor: pair.color.dst_factor as u32,
            operation: pair.color.operation as u32,
            alpha_src_factor: pair.alpha.src_factor as u32,
            alpha_dst_factor: pair.alpha.dst_factor as u32,
            alpha_operation: pair.alpha.operation as u32,
            write_mask: u32::from(rt.blend.write_mask.bits()),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ComputeKeyData {
    shader_hash: u64,
    root_signature: u64,
    flags: u32,
    _pad: u32,
}

fn stage_hash(shader: Option<&ShaderBytecode>) -> u64 {
    shader.map_or(0, ShaderBytecode::hash)
}

/// Remaps the reserved zero sentinel to a valid hash value.
#[inline]
fn non_zero(hash: u64) -> u64 {
    hash.max(1)
}

impl GraphicsPipelineDesc {
    /// Combined content hash over the whole description. Never zero.
    #[must_use]
    pub fn combined_hash(&self) -> u64 {
        let data = GraphicsKeyData {
            shader_hashes: [
                self.vertex.hash(),
                stage_hash(self.hull.as_ref()),
                stage_hash(self.domain.as_ref()),
                stage_hash(self.geometry.as_ref()),
                stage_hash(self.pixel.as_ref()),
            ],
            root_signature: self.root_signature.raw(),
            input_layout_hash: self.input_layout_hash,

            fill_mode: self.rasterizer.fill_mode as u32,
            cull_mode: self.rasterizer.cull_mode as u32,
            front_counter_clockwise: u32::from(self.rasterizer.front_counter_clockwise),
            depth_bias: self.rasterizer.depth_bias,
            depth_bias_clamp_bits: self.rasterizer.depth_bias_clamp_bits,
            slope_scaled_depth_bias_bits: self.rasterizer.slope_scaled_depth_bias_bits,
            depth_clip: u32::from(self.rasterizer.depth_clip),

            depth_enable: u32::from(self.depth_stencil.depth_enable),
            depth_write: u32::from(self.depth_stencil.depth_write),
            depth_compare: self.depth_stencil.depth_compare as u32,
            stencil_enable: u32::from(self.depth_stencil.stencil_enable),
            stencil_read_mask: u32::from(self.depth_stencil.stencil_read_mask),
            stencil_write_mask: u32::from(self.depth_stencil.stencil_write_mask),
            front_compare: self.depth_stencil.front.compare as u32,
            front_fail_op: self.depth_stencil.front.fail_op as u32,
            front_depth_fail_op: self.depth_stencil.front.depth_fail_op as u32,
            front_pass_op: self.depth_stencil.front.pass_op as u32,
            back_compare: self.depth_stencil.back.compare as u32,
            back_fail_op: self.depth_stencil.back.fail_op as u32,
            back_depth_fail_op: self.depth_stencil.back.depth_fail_op as u32,
            back_pass_op: self.depth_stencil.back.pass_op as u32,

            topology: self.topology as u32,
            depth_format: self.depth_format as u32,
            sample_count: self.sample.count,
            sample_mask: self.sample.mask,
            alpha_to_coverage: u32::from(self.sample.alpha_to_coverage),
            flags: u32::from(self.flags.bits()),
            num_render_targets: self.num_render_targets,
        };

        assert!(
            (self.num_render_targets as usize) <= MAX_RENDER_TARGETS,
            "render target count out of range"
        );

        const HEAD: usize = std::mem::size_of::<GraphicsKeyData>();
        const PER_RT: usize = std::mem::size_of::<RenderTargetKeyData>();
        let mut buffer = [0u8; HEAD + MAX_RENDER_TARGETS * PER_RT];
        buffer[..HEAD].copy_from_slice(bytemuck::bytes_of(&data));

        let mut len = HEAD;
        for rt in &self.render_targets[..self.num_render_targets as usize] {
            let rt_data = RenderTargetKeyData::from(rt);
            buffer[len..len + PER_RT].copy_from_slice(bytemuck::bytes_of(&rt_data));
            len += PER_RT;
        }

        non_zero(xxh3_64(&buffer[..len]))
    }
}

impl ComputePipelineDesc {
    /// Combined content hash over the whole description. Never zero.
    #[must_use]
    pub fn combined_hash(&self) -> u64 {
        let data = ComputeKeyData {
            shader_hash: self.shader.hash(),
            root_signature: self.root_signature.raw(),
            flags: u32::from(self.flags.bits()),
            _pad: 0,
        };
        non_zero(xxh3_64(bytemuck::bytes_of(&data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BlendPair, BlendState, CullMode};

    fn base_desc() -> GraphicsPipelineDesc {
        let mut render_targets = [RenderTargetState::default(); MAX_RENDER_TARGETS];
        render_targets[0].format = Format::Rgba16Float;
        GraphicsPipelineDesc {
            root_signature: crate::device::DeviceObject::from_raw(11).id(),
            vertex: ShaderBytecode::new(vec![1u8, 2, 3, 4]),
            hull: None,
            domain: None,
            geometry: None,
            pixel: Some(ShaderBytecode::new(vec![5u8, 6, 7])),
            input_layout_hash: 42,
            topology: PrimitiveTopology::TriangleList,
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState::default(),
            sample: SampleState::default(),
            flags: PipelineFlags::empty(),
            render_targets,
            num_render_targets: 1,
            depth_format: Format::Depth32Float,
        }
    }

    #[test]
    fn combined_hash_is_deterministic_and_non_zero() {
        let desc = base_desc();
        let a = desc.combined_hash();
        let b = desc.combined_hash();
        assert_eq!(a, b);
        assert_ne!(a, 0);
    }

    #[test]
    fn state_changes_change_the_hash() {
        let base = base_desc();
        let base_hash = base.combined_hash();

        let mut blended = base.clone();
        blended.render_targets[0].blend = BlendState {
            blend: Some(BlendPair::default()),
            ..BlendState::default()
        };
        assert_ne!(blended.combined_hash(), base_hash);

        let mut culled = base.clone();
        culled.rasterizer.cull_mode = CullMode::None;
        assert_ne!(culled.combined_hash(), base_hash);

        let mut reshaded = base;
        reshaded.pixel = Some(ShaderBytecode::new(vec![9u8, 9, 9]));
        assert_ne!(reshaded.combined_hash(), base_hash);
    }

    #[test]
    fn bytecode_identity_is_content_based() {
        let a = ShaderBytecode::new(vec![1u8, 2, 3]);
        let b = ShaderBytecode::new(vec![1u8, 2, 3]);
        assert_eq!(a.hash(), b.hash());

        let mut desc_a = base_desc();
        desc_a.vertex = a;
        let mut desc_b = base_desc();
        desc_b.vertex = b;
        assert_eq!(desc_a.combined_hash(), desc_b.combined_hash());
    }

    #[test]
    fn inactive_render_targets_do_not_affect_the_hash() {
        let base = base_desc();
        let mut noisy = base.clone();
        noisy.render_targets[3].format = Format::R32Uint;
        assert_eq!(noisy.combined_hash(), base.combined_hash());
    }
}

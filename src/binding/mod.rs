//! Binding-layout derivation and the root-signature cache.
//!
//! A shader declares exact per-stage resource counts at reflection time.
//! [`quantize`] rounds those counts to coarser, tier-dependent classes so
//! that many shaders share one compiled binding layout; [`root_signature`]
//! turns a quantized layout into an ordered slot list and caches the
//! compiled layout object by structural equality.

pub mod counts;
pub mod quantize;
pub mod root_signature;

pub use counts::{
    BindingSpace, BindingTier, ResourceCounts, ShaderStage, MAX_CONSTANT_BUFFERS,
    MAX_ROOT_CONSTANT_BUFFERS, MAX_RW_VIEWS, MAX_SAMPLERS, MAX_VIEWS, STAGE_COUNT,
};
pub use quantize::{QuantizedBindingLayout, RasterStageCounts};
pub use root_signature::{
    BindingSlot, DescriptorRangeKind, RootSignature, RootSignatureCache, StageBindSlots,
};

//! Ray-tracing pipeline caching and shader-binding-table layout.
//!
//! Ray-tracing pipelines are linked, not monolithically compiled: each
//! shader compiles once into a reusable [`collection`] sub-pipeline, and the
//! [`pipeline`] assembler links cached collections into a full state object.
//! [`shader_table`] computes the packed record layout ray dispatch indexes
//! into.

pub mod collection;
pub mod pipeline;
pub mod shader;
pub mod shader_table;

pub use collection::{CollectionCache, ShaderCollection};
pub use pipeline::{RayTracingPipeline, RayTracingPipelineDesc, StateObjectDesc, StateObjectKind};
pub use shader::{RayTracingShader, RayTracingShaderKind, ShaderIdentifier, SHADER_IDENTIFIER_SIZE};
pub use shader_table::{
    DispatchRegions, ShaderBindingTable, ShaderBindingTableDesc, TableRegion,
    RECORD_BYTE_ALIGNMENT, TABLE_BYTE_ALIGNMENT,
};

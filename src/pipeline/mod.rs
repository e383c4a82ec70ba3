//! Pipeline-state caching.
//!
//! [`key`] defines the immutable pipeline descriptions and their combined
//! content hash; [`cache`] owns every compiled pipeline object and
//! deduplicates creation across threads.

pub mod cache;
pub mod key;

pub use cache::{PipelineCache, PipelineState};
pub use key::{
    ComputePipelineDesc, GraphicsPipelineDesc, PipelineStateDesc, ShaderBytecode,
};

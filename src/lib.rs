//! Kiln RHI — resource-object caching core for the explicit-GPU-API backend.
//!
//! An explicit graphics API makes object *creation* (compiled pipelines,
//! binding layouts, descriptor heaps, ray-tracing state objects) orders of
//! magnitude more expensive than object *use*. This crate owns the caching
//! and lifetime machinery that makes aggressive reuse of those objects
//! correct under multi-threaded recording:
//!
//! - [`binding`]: tier-quantized binding-layout derivation and the
//!   root-signature cache (structural-equality keyed).
//! - [`pipeline`]: the graphics/compute pipeline-state cache (content-hash
//!   keyed, double-checked locking, creation outside the lock).
//! - [`descriptors`]: fence-gated pooling of GPU-visible descriptor heaps
//!   and descriptor-table de-duplication.
//! - [`ray_tracing`]: the per-shader collection cache, full-pipeline
//!   assembly and the shader-binding-table layout builder.
//! - [`context`]: [`context::DeviceContext`], the explicit owner of every
//!   cache, constructed with a [`device::Device`] and dropped before it.
//!
//! The device itself (driver calls, command submission, windowing) lives
//! behind the [`device::Device`] trait and is a collaborator, not part of
//! this crate.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod binding;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod ray_tracing;
pub mod state;

pub use binding::{BindingSpace, BindingTier, QuantizedBindingLayout, ResourceCounts, ShaderStage};
pub use context::DeviceContext;
pub use device::{DescriptorHeapKind, Device, DeviceObject, Fence};
pub use error::{Result, RhiError};

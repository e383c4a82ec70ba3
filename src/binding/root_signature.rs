//! Root-signature building and caching.
//!
//! A [`QuantizedBindingLayout`] expands into an ordered list of binding
//! slots: descriptor-table ranges first, then individually-addressed
//! constant buffers, each group walking the stages in
//! [`STAGE_SLOT_PRIORITY`] order. The compiled layout object is cached by
//! structural equality of the quantized layout under a single mutex —
//! creation is rare and layouts are small, so reads take the same lock.
//!
//! Ray-tracing local layouts prepend three fixed system slots (index-buffer
//! reference, vertex-buffer reference and a small constant block) before any
//! shader-declared slots: every hit-group record needs geometry access
//! regardless of shader content.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::counts::{
    BindingSpace, ResourceCounts, ShaderStage, MAX_ROOT_CONSTANT_BUFFERS, STAGE_COUNT,
    STAGE_SLOT_PRIORITY,
};
use super::quantize::QuantizedBindingLayout;
use crate::device::{Device, DeviceObject, DeviceObjectId};
use crate::error::Result;

// ─── Slot model ──────────────────────────────────────────────────────────────

/// Resource kind of a descriptor-table range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorRangeKind {
    Views,
    RwViews,
    ConstantBuffers,
    Samplers,
}

/// One slot in a compiled binding layout, in bind order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSlot {
    /// A descriptor-table range of one resource kind, visible to one stage.
    DescriptorTable {
        stage: ShaderStage,
        kind: DescriptorRangeKind,
        base_register: u32,
        count: u32,
    },
    /// An individually-addressed constant buffer.
    RootConstantBuffer { stage: ShaderStage, register: u32 },
    /// Raw buffer reference bound directly into a hit-group record.
    SystemBufferReference { register: u32 },
    /// Inline constant block bound directly into a hit-group record.
    SystemConstants { register: u32, num_values: u32 },
}

// Slot costs in DWORDs against the 64-DWORD layout budget. Local-space
// descriptor tables cost double.
const TABLE_COST_GLOBAL: u32 = 1;
const TABLE_COST_LOCAL: u32 = 2;
const ROOT_DESCRIPTOR_COST: u32 = 2;
const ROOT_CONSTANT_COST: u32 = 1;

/// Architectural layout size budget in DWORDs.
pub const ROOT_BUDGET_DWORDS: u32 = 64;

/// Register of the system index-buffer reference in local layouts.
pub const SYSTEM_INDEX_BUFFER_REGISTER: u32 = 0;
/// Register of the system vertex-buffer reference in local layouts.
pub const SYSTEM_VERTEX_BUFFER_REGISTER: u32 = 1;
/// Register of the system constant block in local layouts.
pub const SYSTEM_CONSTANTS_REGISTER: u32 = 0;
/// 32-bit values in the system constant block: fetch configuration,
/// index-buffer byte offset, per-record user data, alignment padding.
pub const SYSTEM_CONSTANT_COUNT: u32 = 4;

/// Per-stage map from resource kind to the slot index that serves it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageBindSlots {
    pub views_table: Option<u8>,
    pub rw_views_table: Option<u8>,
    pub constant_buffer_table: Option<u8>,
    pub samplers_table: Option<u8>,
    /// Slot of the stage's first individually-addressed constant buffer;
    /// subsequent registers occupy consecutive slots.
    pub root_constant_buffer_base: Option<u8>,
    /// Whether the stage can reach any slot at all. Invisible stages are
    /// denied access in the compiled layout.
    pub visible: bool,
}

// ─── Compiled layout ─────────────────────────────────────────────────────────

/// A compiled, driver-validated binding layout.
///
/// Owned exclusively by the [`RootSignatureCache`]; pipelines reference it
/// by [`DeviceObjectId`].
pub struct RootSignature {
    object: DeviceObject,
    layout: QuantizedBindingLayout,
    bind_slots: [StageBindSlots; STAGE_COUNT],
    cost_dwords: u32,
}

impl RootSignature {
    /// Observer id of the compiled layout object.
    #[inline]
    #[must_use]
    pub fn id(&self) -> DeviceObjectId {
        self.object.id()
    }

    /// The quantized layout this object was compiled from.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &QuantizedBindingLayout {
        &self.layout
    }

    /// Slot map for one stage.
    #[inline]
    #[must_use]
    pub fn bind_slots(&self, stage: ShaderStage) -> &StageBindSlots {
        &self.bind_slots[stage as usize]
    }

    /// Total layout size in DWORDs.
    #[inline]
    #[must_use]
    pub fn cost_dwords(&self) -> u32 {
        self.cost_dwords
    }

    /// Total layout size in bytes; local layouts use this to size the
    /// per-record data area of a shader-binding table.
    #[inline]
    #[must_use]
    pub fn size_bytes(&self) -> u32 {
        self.cost_dwords * 4
    }

    fn compile(device: &dyn Device, layout: QuantizedBindingLayout) -> Result<Self> {
        let built = build_slots(&layout);
        let object = device.create_binding_layout_object(&built.slots, layout.space)?;
        Ok(Self {
            object,
            layout,
            bind_slots: built.bind_slots,
            cost_dwords: built.cost_dwords,
        })
    }
}

struct BuiltSlots {
    slots: SmallVec<[BindingSlot; 16]>,
    bind_slots: [StageBindSlots; STAGE_COUNT],
    cost_dwords: u32,
}

/// Expands a quantized layout into its ordered slot list and per-stage
/// slot map.
fn build_slots(layout: &QuantizedBindingLayout) -> BuiltSlots {
    let mut slots: SmallVec<[BindingSlot; 16]> = SmallVec::new();
    let mut bind_slots = [StageBindSlots::default(); STAGE_COUNT];
    let mut cost = 0u32;

    let local = matches!(layout.space, BindingSpace::RayTracingLocal);
    let table_cost = if local {
        TABLE_COST_LOCAL
    } else {
        TABLE_COST_GLOBAL
    };

    if local {
        // System slots come first; hit-group records are written with this
        // exact layout in mind.
        slots.push(BindingSlot::SystemBufferReference {
            register: SYSTEM_INDEX_BUFFER_REGISTER,
        });
        cost += ROOT_DESCRIPTOR_COST;
        slots.push(BindingSlot::SystemBufferReference {
            register: SYSTEM_VERTEX_BUFFER_REGISTER,
        });
        cost += ROOT_DESCRIPTOR_COST;
        slots.push(BindingSlot::SystemConstants {
            register: SYSTEM_CONSTANTS_REGISTER,
            num_values: SYSTEM_CONSTANT_COUNT,
        });
        cost += ROOT_CONSTANT_COST * SYSTEM_CONSTANT_COUNT;
    }

    // Descriptor tables for every stage, then individually-addressed
    // constant buffers for every stage.
    for stage in STAGE_SLOT_PRIORITY {
        let counts: ResourceCounts = layout.stage_counts[stage as usize];
        let stage_map = &mut bind_slots[stage as usize];
        stage_map.visible = !counts.is_empty();

        if counts.views > 0 {
            stage_map.views_table = Some(slots.len() as u8);
            slots.push(BindingSlot::DescriptorTable {
                stage,
                kind: DescriptorRangeKind::Views,
                base_register: 0,
                count: counts.views,
            });
            cost += table_cost;
        }

        if counts.constant_buffers > MAX_ROOT_CONSTANT_BUFFERS {
            assert!(
                !local,
                "constant-buffer descriptor tables are not supported in local binding layouts"
            );
            // The excess above the individually-addressed range shares one
            // table.
            stage_map.constant_buffer_table = Some(slots.len() as u8);
            slots.push(BindingSlot::DescriptorTable {
                stage,
                kind: DescriptorRangeKind::ConstantBuffers,
                base_register: MAX_ROOT_CONSTANT_BUFFERS,
                count: counts.constant_buffers - MAX_ROOT_CONSTANT_BUFFERS,
            });
            cost += table_cost;
        }

        if counts.samplers > 0 {
            stage_map.samplers_table = Some(slots.len() as u8);
            slots.push(BindingSlot::DescriptorTable {
                stage,
                kind: DescriptorRangeKind::Samplers,
                base_register: 0,
                count: counts.samplers,
            });
            cost += table_cost;
        }

        if counts.rw_views > 0 {
            stage_map.rw_views_table = Some(slots.len() as u8);
            slots.push(BindingSlot::DescriptorTable {
                stage,
                kind: DescriptorRangeKind::RwViews,
                base_register: 0,
                count: counts.rw_views,
            });
            cost += table_cost;
        }
    }

    for stage in STAGE_SLOT_PRIORITY {
        let counts = layout.stage_counts[stage as usize];
        let root_count = counts.constant_buffers.min(MAX_ROOT_CONSTANT_BUFFERS);
        for register in 0..root_count {
            if register == 0 {
                bind_slots[stage as usize].root_constant_buffer_base = Some(slots.len() as u8);
            }
            slots.push(BindingSlot::RootConstantBuffer { stage, register });
            cost += ROOT_DESCRIPTOR_COST;
        }
    }

    assert!(
        cost <= ROOT_BUDGET_DWORDS,
        "binding layout exceeds the {ROOT_BUDGET_DWORDS}-DWORD budget ({cost})"
    );

    BuiltSlots {
        slots,
        bind_slots,
        cost_dwords: cost,
    }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Cache of compiled binding layouts, keyed by structural equality of the
/// quantized layout.
pub struct RootSignatureCache {
    device: Arc<dyn Device>,
    map: Mutex<FxHashMap<QuantizedBindingLayout, Arc<RootSignature>>>,
}

impl RootSignatureCache {
    #[must_use]
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            map: Mutex::new(FxHashMap::default()),
        }
    }

    /// Resolves the compiled layout for `layout`, creating it on first
    /// sight.
    ///
    /// Creation happens under the cache mutex: layouts are compiled a
    /// handful of times per run and the serialization keeps the map trivially
    /// consistent. A device failure propagates without retry.
    pub fn get_or_create(&self, layout: &QuantizedBindingLayout) -> Result<Arc<RootSignature>> {
        let mut map = self.map.lock();
        if let Some(existing) = map.get(layout) {
            return Ok(existing.clone());
        }

        let compiled = RootSignature::compile(self.device.as_ref(), *layout).map_err(|err| {
            log::error!(
                "binding layout creation failed (layout {:#018x}): {err}",
                layout.structural_hash()
            );
            err
        })?;
        log::debug!(
            "compiled binding layout {:#018x} ({} DWORDs, {:?})",
            layout.structural_hash(),
            compiled.cost_dwords(),
            layout.space
        );

        let shared = Arc::new(compiled);
        map.insert(*layout, shared.clone());
        Ok(shared)
    }

    /// Number of compiled layouts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// Whether no layout has been compiled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RootSignatureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootSignatureCache")
            .field("layouts", &self.len())
            .finish()
    }
}

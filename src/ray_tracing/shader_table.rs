//! Shader-binding-table layout and population.
//!
//! The table is a packed byte buffer of fixed-stride records in five
//! sections, laid out in order: ray-generation, miss, default hit group,
//! indexable hit groups, callable. Record strides are rounded to the record
//! alignment; section offsets are rounded to the (coarser) table alignment
//! so any record can start a dispatch region. Ray-generation and miss
//! records use the table alignment as their stride outright, which lets a
//! dispatch select any of them without re-laying-out the buffer.
//!
//! Writes mutate the CPU copy and mark the table dirty;
//! [`ShaderBindingTable::upload`] moves the image into GPU-visible memory
//! and the buffer stays immutable for GPU reads until the next mutation.

use crate::device::{Device, DeviceObject, DeviceObjectId};
use crate::error::Result;
use crate::ray_tracing::shader::{ShaderIdentifier, SHADER_IDENTIFIER_SIZE};

/// Alignment of individual records within a section.
pub const RECORD_BYTE_ALIGNMENT: u32 = 32;
/// Alignment of section start offsets (and of the buffer itself).
pub const TABLE_BYTE_ALIGNMENT: u32 = 64;
/// Architectural ceiling on record-local root data.
pub const MAX_LOCAL_ROOT_DATA_SIZE: u32 = 4096;

// Ray-gen and miss records are stride-aligned to the table alignment so a
// dispatch can start at any record index.
const RAY_GEN_RECORD_STRIDE: u32 = TABLE_BYTE_ALIGNMENT;
const MISS_RECORD_STRIDE: u32 = TABLE_BYTE_ALIGNMENT;

/// Smallest view heap worth carving for record-local descriptors.
const MIN_VIEW_DESCRIPTORS: u32 = 1024;

#[inline]
fn round_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Record counts and record-local sizing for one table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderBindingTableDesc {
    pub num_ray_gen_records: u32,
    pub num_miss_records: u32,
    pub num_hit_records: u32,
    pub num_callable_records: u32,
    /// Bytes of local root data per hit/callable record, excluding the
    /// shader identifier.
    pub local_root_data_size: u32,
    /// Most view descriptors any single record references; sizes the
    /// record-local descriptor heap.
    pub max_view_descriptors_per_record: u32,
}

impl ShaderBindingTableDesc {
    /// Whether records bind local resources, requiring a dedicated
    /// descriptor-table cache for the dispatch.
    #[must_use]
    pub fn needs_descriptor_cache(&self) -> bool {
        (self.num_hit_records + self.num_callable_records) * self.local_root_data_size != 0
    }

    /// View-descriptor capacity to reserve for record-local tables.
    #[must_use]
    pub fn required_view_descriptors(&self) -> u32 {
        (self.num_hit_records * self.max_view_descriptors_per_record)
            .clamp(
                MIN_VIEW_DESCRIPTORS,
                crate::descriptors::table_cache::MAX_POOLED_VIEW_DESCRIPTORS,
            )
    }
}

/// One dispatch region: byte offset into the table buffer, record stride and
/// total size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableRegion {
    pub offset: u64,
    pub stride: u64,
    pub size: u64,
}

/// Per-section dispatch regions for one ray dispatch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRegions {
    pub ray_gen: TableRegion,
    pub miss: TableRegion,
    pub hit_group: TableRegion,
    pub callable: TableRegion,
}

/// A packed shader-binding table.
pub struct ShaderBindingTable {
    data: Vec<u8>,
    dirty: bool,
    buffer: Option<DeviceObject>,

    num_ray_gen: u32,
    num_miss: u32,
    num_hit: u32,
    num_callable: u32,
    num_local_records: u32,

    ray_gen_offset: u32,
    miss_offset: u32,
    default_hit_offset: u32,
    hit_offset: u32,
    callable_offset: u32,
    /// Hit and callable records share one local-record index space starting
    /// at `hit_offset`.
    local_offset: u32,
    callable_record_index_offset: u32,

    /// Identifier plus local data, before record alignment. Out-of-bounds
    /// checks use this, not the rounded stride.
    local_record_size_unaligned: u32,
    local_record_stride: u32,
}

impl ShaderBindingTable {
    /// Computes the packed layout and zero-fills the buffer.
    #[must_use]
    pub fn new(desc: &ShaderBindingTableDesc) -> Self {
        assert!(
            desc.num_ray_gen_records >= 1,
            "every shader table carries at least one ray-generation record"
        );
        assert!(
            desc.local_root_data_size <= MAX_LOCAL_ROOT_DATA_SIZE,
            "record-local root data exceeds {MAX_LOCAL_ROOT_DATA_SIZE} bytes"
        );

        let identifier_size = SHADER_IDENTIFIER_SIZE as u32;
        let local_record_size_unaligned = identifier_size + desc.local_root_data_size;
        let local_record_stride = round_up(local_record_size_unaligned, RECORD_BYTE_ALIGNMENT);

        let mut total = 0u32;

        let ray_gen_offset = total;
        total += desc.num_ray_gen_records * RAY_GEN_RECORD_STRIDE;
        total = round_up(total, TABLE_BYTE_ALIGNMENT);

        let miss_offset = total;
        total += desc.num_miss_records * MISS_RECORD_STRIDE;
        total = round_up(total, TABLE_BYTE_ALIGNMENT);

        let default_hit_offset = total;
        total += identifier_size;
        total = round_up(total, TABLE_BYTE_ALIGNMENT);

        let hit_offset = total;
        total += desc.num_hit_records * local_record_stride;
        total = round_up(total, TABLE_BYTE_ALIGNMENT);

        let callable_offset = total;
        total += desc.num_callable_records * local_record_stride;
        total = round_up(total, TABLE_BYTE_ALIGNMENT);

        let local_offset = hit_offset;
        let callable_record_index_offset = (callable_offset - local_offset) / local_record_stride;
        let num_local_records = (total - local_offset) / local_record_stride;

        Self {
            data: vec![0u8; total as usize],
            dirty: true,
            buffer: None,
            num_ray_gen: desc.num_ray_gen_records,
            num_miss: desc.num_miss_records,
            num_hit: desc.num_hit_records,
            num_callable: desc.num_callable_records,
            num_local_records,
            ray_gen_offset,
            miss_offset,
            default_hit_offset,
            hit_offset,
            callable_offset,
            local_offset,
            callable_record_index_offset,
            local_record_size_unaligned,
            local_record_stride,
        }
    }

    // ── Record writes ────────────────────────────────────────────────────────

    fn write_data(&mut self, offset: u32, bytes: &[u8]) {
        let offset = offset as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.dirty = true;
    }

    /// Writes one ray-generation record's identifier.
    pub fn set_ray_gen_identifier(&mut self, record_index: u32, identifier: ShaderIdentifier) {
        assert!(record_index < self.num_ray_gen, "ray-gen record out of bounds");
        let offset = self.ray_gen_offset + record_index * RAY_GEN_RECORD_STRIDE;
        self.write_data(offset, identifier.as_bytes());
    }

    /// Writes one miss record's identifier.
    pub fn set_miss_identifier(&mut self, record_index: u32, identifier: ShaderIdentifier) {
        assert!(record_index < self.num_miss, "miss record out of bounds");
        let offset = self.miss_offset + record_index * MISS_RECORD_STRIDE;
        self.write_data(offset, identifier.as_bytes());
    }

    /// Writes the identifier used when hit-group indexing is disabled.
    pub fn set_default_hit_group_identifier(&mut self, identifier: ShaderIdentifier) {
        let offset = self.default_hit_offset;
        self.write_data(offset, identifier.as_bytes());
    }

    /// Writes one indexable hit record's identifier.
    pub fn set_hit_group_identifier(&mut self, record_index: u32, identifier: ShaderIdentifier) {
        assert!(record_index < self.num_hit, "hit record out of bounds");
        self.write_local_record(record_index, 0, identifier.as_bytes());
    }

    /// Writes one callable record's identifier.
    pub fn set_callable_identifier(&mut self, record_index: u32, identifier: ShaderIdentifier) {
        assert!(record_index < self.num_callable, "callable record out of bounds");
        self.write_local_record(
            self.callable_record_index_offset + record_index,
            0,
            identifier.as_bytes(),
        );
    }

    /// Writes all ray-generation identifiers. `identifiers` must cover every
    /// record.
    pub fn set_ray_gen_identifiers(&mut self, identifiers: &[ShaderIdentifier]) {
        assert_eq!(identifiers.len() as u32, self.num_ray_gen);
        for (index, identifier) in identifiers.iter().enumerate() {
            self.set_ray_gen_identifier(index as u32, *identifier);
        }
    }

    /// Writes all miss identifiers. `identifiers` must cover every record.
    pub fn set_miss_identifiers(&mut self, identifiers: &[ShaderIdentifier]) {
        assert_eq!(identifiers.len() as u32, self.num_miss);
        for (index, identifier) in identifiers.iter().enumerate() {
            self.set_miss_identifier(index as u32, *identifier);
        }
    }

    /// Writes local root data into a hit/callable record, after the
    /// identifier. `offset` and the data length must be 4-byte aligned and
    /// stay inside the record's unaligned size.
    pub fn set_local_shader_parameters(&mut self, record_index: u32, offset: u32, data: &[u8]) {
        let offset = SHADER_IDENTIFIER_SIZE as u32 + offset;
        self.write_local_record(record_index, offset, data);
    }

    fn write_local_record(&mut self, record_index: u32, offset_in_record: u32, bytes: &[u8]) {
        assert!(
            offset_in_record % 4 == 0 && bytes.len() % 4 == 0,
            "record parameters must be written on 4-byte boundaries"
        );
        assert!(
            offset_in_record + bytes.len() as u32 <= self.local_record_size_unaligned,
            "record write exceeds the record's data size"
        );
        assert!(
            record_index < self.num_local_records,
            "local record index out of bounds"
        );
        let offset = self.local_offset + self.local_record_stride * record_index + offset_in_record;
        self.write_data(offset, bytes);
    }

    // ── Upload ───────────────────────────────────────────────────────────────

    /// Whether CPU-side mutations are pending upload.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Copies the table into GPU-visible memory. A no-op when clean.
    pub fn upload(&mut self, device: &dyn Device) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.buffer = Some(device.upload_shader_table(&self.data, TABLE_BYTE_ALIGNMENT)?);
        self.dirty = false;
        Ok(())
    }

    /// The GPU buffer, once uploaded.
    #[must_use]
    pub fn buffer(&self) -> Option<DeviceObjectId> {
        self.buffer.as_ref().map(DeviceObject::id)
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Computes the dispatch regions for one ray dispatch.
    ///
    /// With hit-group indexing disabled the hit region degenerates to the
    /// single default record: zero stride, minimal (one-alignment-unit)
    /// size.
    #[must_use]
    pub fn dispatch_regions(
        &self,
        ray_gen_index: u32,
        miss_base_index: u32,
        allow_hit_group_indexing: bool,
    ) -> DispatchRegions {
        assert!(
            !self.dirty,
            "shader table has pending writes; upload before dispatching"
        );
        assert!(ray_gen_index < self.num_ray_gen);
        assert!(miss_base_index < self.num_miss || self.num_miss == 0);

        let ray_gen = TableRegion {
            offset: u64::from(self.ray_gen_offset + ray_gen_index * RAY_GEN_RECORD_STRIDE),
            stride: 0,
            size: u64::from(RAY_GEN_RECORD_STRIDE),
        };
        let miss = TableRegion {
            offset: u64::from(self.miss_offset + miss_base_index * MISS_RECORD_STRIDE),
            stride: u64::from(MISS_RECORD_STRIDE),
            size: u64::from(MISS_RECORD_STRIDE),
        };

        let hit_group = if allow_hit_group_indexing {
            TableRegion {
                offset: u64::from(self.hit_offset),
                stride: u64::from(self.local_record_stride),
                size: u64::from(self.num_hit * self.local_record_stride),
            }
        } else {
            // Zero stride disables record indexing; every ray reads the
            // default record.
            TableRegion {
                offset: u64::from(self.default_hit_offset),
                stride: 0,
                size: u64::from(TABLE_BYTE_ALIGNMENT),
            }
        };

        let callable = if self.num_callable > 0 {
            TableRegion {
                offset: u64::from(self.callable_offset),
                stride: u64::from(self.local_record_stride),
                size: u64::from(self.num_callable * self.local_record_stride),
            }
        } else {
            TableRegion::default()
        };

        DispatchRegions {
            ray_gen,
            miss,
            hit_group,
            callable,
        }
    }

    // ── Introspection ────────────────────────────────────────────────────────

    /// Total table size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Stride of hit and callable records.
    #[must_use]
    pub fn local_record_stride(&self) -> u32 {
        self.local_record_stride
    }

    /// Section offsets in layout order: ray-gen, miss, default-hit, hit,
    /// callable.
    #[must_use]
    pub fn section_offsets(&self) -> [u32; 5] {
        [
            self.ray_gen_offset,
            self.miss_offset,
            self.default_hit_offset,
            self.hit_offset,
            self.callable_offset,
        ]
    }

    /// Raw table bytes (CPU copy).
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for ShaderBindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderBindingTable")
            .field("size_bytes", &self.data.len())
            .field("ray_gen", &self.num_ray_gen)
            .field("miss", &self.num_miss)
            .field("hit", &self.num_hit)
            .field("callable", &self.num_callable)
            .field("dirty", &self.dirty)
            .finish()
    }
}

//! Tier quantization of resource counts.
//!
//! Rounding declared counts up to coarser classes means two shaders with
//! different exact counts frequently share one compiled binding layout.
//! Derivation is a pure function of (tier, counts): no allocation, no
//! failure modes — the tier and stage enums make invalid inputs
//! unrepresentable.

use xxhash_rust::xxh3::xxh3_64;

use super::counts::{
    BindingSpace, BindingTier, ResourceCounts, ShaderStage, MAX_CONSTANT_BUFFERS,
    MAX_ROOT_CONSTANT_BUFFERS, MAX_RW_VIEWS, MAX_SAMPLERS, MAX_VIEWS, STAGE_COUNT,
};

/// A binding layout with tier-quantized per-stage counts.
///
/// Equality is structural; the root-signature cache keys on this type
/// directly, so two shader sets that quantize identically resolve to the
/// same compiled layout object.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuantizedBindingLayout {
    /// Quantized counts indexed by [`ShaderStage`].
    pub stage_counts: [ResourceCounts; STAGE_COUNT],
    /// Binding space the compiled layout targets.
    pub space: BindingSpace,
    /// Whether the layout admits an input-assembler vertex layout.
    pub allow_input_layout: bool,
    /// Whether the layout admits stream output.
    pub allow_stream_output: bool,
}

/// Exact per-stage counts for a raster shader set. Absent stages contribute
/// no slots.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterStageCounts {
    pub vertex: Option<ResourceCounts>,
    pub hull: Option<ResourceCounts>,
    pub domain: Option<ResourceCounts>,
    pub geometry: Option<ResourceCounts>,
    pub pixel: Option<ResourceCounts>,
    pub allow_input_layout: bool,
    pub allow_stream_output: bool,
}

impl QuantizedBindingLayout {
    /// Derives the layout for a raster shader set.
    ///
    /// Read-write views are only admitted at the pixel stage; other raster
    /// stages must declare zero.
    #[must_use]
    pub fn for_raster(tier: BindingTier, stages: &RasterStageCounts) -> Self {
        let mut layout = Self {
            space: BindingSpace::Raster,
            allow_input_layout: stages.allow_input_layout,
            allow_stream_output: stages.allow_stream_output,
            ..Self::default()
        };

        let mut apply = |stage: ShaderStage, counts: Option<ResourceCounts>, allow_rw: bool| {
            if let Some(counts) = counts {
                layout.stage_counts[stage as usize] = quantize_counts(tier, counts, allow_rw);
            }
        };

        apply(ShaderStage::Vertex, stages.vertex, false);
        apply(ShaderStage::Hull, stages.hull, false);
        apply(ShaderStage::Domain, stages.domain, false);
        apply(ShaderStage::Geometry, stages.geometry, false);
        apply(ShaderStage::Pixel, stages.pixel, true);

        layout
    }

    /// Derives the layout for a compute shader (all-stage visibility).
    #[must_use]
    pub fn for_compute(tier: BindingTier, counts: ResourceCounts) -> Self {
        Self::for_all_stage(tier, counts, BindingSpace::Raster)
    }

    /// Derives a ray-tracing layout (global or local space) from a single
    /// all-stage count set.
    #[must_use]
    pub fn for_ray_tracing(
        tier: BindingTier,
        counts: ResourceCounts,
        space: BindingSpace,
    ) -> Self {
        debug_assert!(!matches!(space, BindingSpace::Raster));
        Self::for_all_stage(tier, counts, space)
    }

    fn for_all_stage(tier: BindingTier, counts: ResourceCounts, space: BindingSpace) -> Self {
        let mut layout = Self {
            space,
            ..Self::default()
        };
        layout.stage_counts[ShaderStage::All as usize] = quantize_counts(tier, counts, true);
        layout
    }

    /// Quantized counts for one stage.
    #[inline]
    #[must_use]
    pub fn stage(&self, stage: ShaderStage) -> &ResourceCounts {
        &self.stage_counts[stage as usize]
    }

    /// Stable 64-bit structural hash, used for log/error identity.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut packed = [0u32; STAGE_COUNT * 4 + 3];
        for (i, counts) in self.stage_counts.iter().enumerate() {
            packed[i * 4] = counts.views;
            packed[i * 4 + 1] = counts.rw_views;
            packed[i * 4 + 2] = counts.constant_buffers;
            packed[i * 4 + 3] = counts.samplers;
        }
        packed[STAGE_COUNT * 4] = self.space as u32;
        packed[STAGE_COUNT * 4 + 1] = u32::from(self.allow_input_layout);
        packed[STAGE_COUNT * 4 + 2] = u32::from(self.allow_stream_output);
        xxh3_64(bytemuck::cast_slice(&packed))
    }
}

/// Quantizes one stage's counts for the given tier.
///
/// Tier one rounds view and sampler counts up to the next power of two
/// (clamped to the per-stage caps); finer tiers bind them exactly.
/// Read-write views and the promoted part of the constant-buffer range
/// follow the same rule one tier later. Constant buffers at or below
/// [`MAX_ROOT_CONSTANT_BUFFERS`] always pass through untouched — they get
/// individually-addressed slots, not a table range.
#[must_use]
pub fn quantize_counts(tier: BindingTier, counts: ResourceCounts, allow_rw: bool) -> ResourceCounts {
    assert!(
        allow_rw || counts.rw_views == 0,
        "read-write views are only supported at the pixel and all-stage visibilities"
    );

    let views = match tier {
        BindingTier::One => round_up_clamped(counts.views, MAX_VIEWS),
        _ => counts.views.min(MAX_VIEWS),
    };
    let samplers = match tier {
        BindingTier::One => round_up_clamped(counts.samplers, MAX_SAMPLERS),
        _ => counts.samplers.min(MAX_SAMPLERS),
    };

    let constant_buffers = if counts.constant_buffers > MAX_ROOT_CONSTANT_BUFFERS {
        match tier {
            BindingTier::One | BindingTier::Two => {
                round_up_clamped(counts.constant_buffers, MAX_CONSTANT_BUFFERS)
            }
            BindingTier::Three => counts.constant_buffers.min(MAX_CONSTANT_BUFFERS),
        }
    } else {
        counts.constant_buffers
    };

    let rw_views = if allow_rw {
        match tier {
            BindingTier::One | BindingTier::Two => round_up_clamped(counts.rw_views, MAX_RW_VIEWS),
            BindingTier::Three => counts.rw_views.min(MAX_RW_VIEWS),
        }
    } else {
        0
    };

    ResourceCounts {
        views,
        rw_views,
        constant_buffers,
        samplers,
    }
}

#[inline]
fn round_up_clamped(count: u32, max: u32) -> u32 {
    if count == 0 {
        0
    } else {
        count.next_power_of_two().min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_one_rounds_to_power_of_two() {
        let counts = ResourceCounts {
            views: 3,
            rw_views: 0,
            constant_buffers: 1,
            samplers: 5,
        };
        let q = quantize_counts(BindingTier::One, counts, false);
        assert_eq!(q.views, 4);
        assert_eq!(q.samplers, 8);
        assert_eq!(q.constant_buffers, 1);
    }

    #[test]
    fn tier_one_clamps_at_caps() {
        let counts = ResourceCounts {
            views: 47,
            rw_views: 0,
            constant_buffers: 0,
            samplers: 15,
        };
        let q = quantize_counts(BindingTier::One, counts, false);
        // next_power_of_two(47) = 64, clamped to the cap.
        assert_eq!(q.views, MAX_VIEWS);
        assert_eq!(q.samplers, MAX_SAMPLERS);
    }

    #[test]
    fn finer_tiers_pass_views_through() {
        let counts = ResourceCounts {
            views: 3,
            rw_views: 0,
            constant_buffers: 0,
            samplers: 5,
        };
        for tier in [BindingTier::Two, BindingTier::Three] {
            let q = quantize_counts(tier, counts, false);
            assert_eq!(q.views, 3);
            assert_eq!(q.samplers, 5);
        }
    }

    #[test]
    fn constant_buffers_quantize_only_above_root_threshold() {
        let below = ResourceCounts {
            constant_buffers: MAX_ROOT_CONSTANT_BUFFERS,
            ..ResourceCounts::default()
        };
        let above = ResourceCounts {
            constant_buffers: MAX_ROOT_CONSTANT_BUFFERS + 1,
            ..ResourceCounts::default()
        };
        for tier in [BindingTier::One, BindingTier::Two, BindingTier::Three] {
            assert_eq!(
                quantize_counts(tier, below, false).constant_buffers,
                MAX_ROOT_CONSTANT_BUFFERS
            );
        }
        assert_eq!(
            quantize_counts(BindingTier::Two, above, false).constant_buffers,
            16
        );
        assert_eq!(
            quantize_counts(BindingTier::Three, above, false).constant_buffers,
            MAX_ROOT_CONSTANT_BUFFERS + 1
        );
    }

    #[test]
    fn zero_counts_stay_zero() {
        let q = quantize_counts(BindingTier::One, ResourceCounts::default(), true);
        assert!(q.is_empty());
    }

    #[test]
    #[should_panic(expected = "read-write views")]
    fn rw_views_rejected_where_not_allowed() {
        let counts = ResourceCounts {
            rw_views: 1,
            ..ResourceCounts::default()
        };
        let _ = quantize_counts(BindingTier::Three, counts, false);
    }

    #[test]
    fn derivation_is_deterministic() {
        let stages = RasterStageCounts {
            vertex: Some(ResourceCounts {
                views: 2,
                constant_buffers: 1,
                ..ResourceCounts::default()
            }),
            pixel: Some(ResourceCounts {
                views: 7,
                constant_buffers: 2,
                samplers: 3,
                ..ResourceCounts::default()
            }),
            allow_input_layout: true,
            ..RasterStageCounts::default()
        };
        let a = QuantizedBindingLayout::for_raster(BindingTier::One, &stages);
        let b = QuantizedBindingLayout::for_raster(BindingTier::One, &stages);
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
        assert_eq!(a.stage(ShaderStage::Pixel).views, 8);
        assert_eq!(a.stage(ShaderStage::Pixel).samplers, 4);
        assert_eq!(a.stage(ShaderStage::Vertex).views, 2);
    }
}

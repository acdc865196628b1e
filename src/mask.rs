//! Spatial token keep-mask over the vision encoder's patch grid.
//!
//! Stage two of the cascade. Detection boxes are dilated, projected onto a
//! fixed G×G patch grid, and OR-ed into one boolean keep-mask. A hard
//! minimum-token floor guards against under-covering a possible hazard:
//! when the computed mask keeps too few patches it is replaced wholesale
//! with an all-true mask.
//!
//! The whole computation is pure: identical detections and configuration
//! always produce a bit-identical mask.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::detect::Detection;
use crate::dilation::DilationPolicy;

/// Geometry of the patch grid: a square image divided into square patches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PatchGrid {
    image_size: u32,
    patch_size: u32,
}

impl PatchGrid {
    pub fn new(image_size: u32, patch_size: u32) -> Result<Self> {
        if patch_size == 0 {
            return Err(anyhow!("patch_size must be non-zero"));
        }
        if image_size == 0 || image_size % patch_size != 0 {
            return Err(anyhow!(
                "image_size {} is not a positive multiple of patch_size {}",
                image_size,
                patch_size
            ));
        }
        Ok(Self {
            image_size,
            patch_size,
        })
    }

    /// Patches per side, G.
    pub fn side(&self) -> u32 {
        self.image_size / self.patch_size
    }

    /// Total patches, P = G².
    pub fn patch_count(&self) -> usize {
        (self.side() as usize).pow(2)
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }
}

/// Boolean keep-mask of fixed length P, row-major over the patch grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpatialMask {
    bits: Vec<bool>,
    side: u32,
}

impl SpatialMask {
    fn empty(grid: PatchGrid) -> Self {
        Self {
            bits: vec![false; grid.patch_count()],
            side: grid.side(),
        }
    }

    pub fn all_kept(grid: PatchGrid) -> Self {
        Self {
            bits: vec![true; grid.patch_count()],
            side: grid.side(),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn kept_count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Indices of kept patches in ascending order.
    pub fn kept_indices(&self) -> Vec<usize> {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect()
    }

    /// Text rendering for logs and the CLI: `#` kept, `.` pruned.
    pub fn render_ascii(&self) -> String {
        let side = self.side as usize;
        let mut out = String::with_capacity(self.bits.len() + side);
        for row in self.bits.chunks(side) {
            for &bit in row {
                out.push(if bit { '#' } else { '.' });
            }
            out.push('\n');
        }
        out
    }
}

/// Result of building a mask for one frame.
#[derive(Clone, Debug, Serialize)]
pub struct MaskOutcome {
    pub mask: SpatialMask,
    /// Kept patches, after any floor fallback.
    pub kept: usize,
    /// Total patches P.
    pub total: usize,
    /// True when the floor fallback replaced the computed mask.
    pub floored: bool,
    /// Whether the upstream global summary token (outside the P-length
    /// mask) is preserved. It is never subject to pruning.
    pub summary_token_kept: bool,
}

impl MaskOutcome {
    pub fn reduction_ratio(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        1.0 - self.kept as f32 / self.total as f32
    }
}

/// Builds keep-masks from detections. Immutable after construction.
#[derive(Clone, Debug)]
pub struct MaskBuilder {
    grid: PatchGrid,
    dilation: DilationPolicy,
    min_tokens: usize,
    preserve_summary_token: bool,
}

impl MaskBuilder {
    pub fn new(
        grid: PatchGrid,
        dilation: DilationPolicy,
        min_tokens: usize,
        preserve_summary_token: bool,
    ) -> Self {
        Self {
            grid,
            dilation,
            min_tokens,
            preserve_summary_token,
        }
    }

    pub fn grid(&self) -> PatchGrid {
        self.grid
    }

    pub fn preserves_summary_token(&self) -> bool {
        self.preserve_summary_token
    }

    /// All-kept outcome for runs with pruning disabled.
    pub fn passthrough(&self) -> MaskOutcome {
        let total = self.grid.patch_count();
        MaskOutcome {
            mask: SpatialMask::all_kept(self.grid),
            kept: total,
            total,
            floored: false,
            summary_token_kept: self.preserve_summary_token,
        }
    }

    /// Union of the dilated, grid-projected detection boxes, with the
    /// minimum-token floor applied.
    pub fn build(&self, detections: &[Detection]) -> MaskOutcome {
        let mut mask = SpatialMask::empty(self.grid);
        let side = self.grid.side();

        for det in detections {
            let alpha = self.dilation.dilation(&det.class_name);
            let dilated = det.bbox.dilated(alpha);

            // Project corners onto the grid, end-exclusive. A degenerate
            // box pinned to the far edge yields an empty range.
            let p1_x = (dilated.x1 * side as f32).floor() as u32;
            let p1_y = (dilated.y1 * side as f32).floor() as u32;
            let p2_x = (((dilated.x2 * side as f32).floor() as u32) + 1).min(side);
            let p2_y = (((dilated.y2 * side as f32).floor() as u32) + 1).min(side);

            for py in p1_y..p2_y {
                for px in p1_x..p2_x {
                    mask.bits[(py * side + px) as usize] = true;
                }
            }
        }

        let computed = mask.kept_count();
        let total = self.grid.patch_count();

        if computed < self.min_tokens {
            log::warn!(
                "keep-mask under token floor ({} < {}), falling back to all {} patches",
                computed,
                self.min_tokens,
                total
            );
            return MaskOutcome {
                mask: SpatialMask::all_kept(self.grid),
                kept: total,
                total,
                floored: true,
                summary_token_kept: self.preserve_summary_token,
            };
        }

        MaskOutcome {
            mask,
            kept: computed,
            total,
            floored: false,
            summary_token_kept: self.preserve_summary_token,
        }
    }
}

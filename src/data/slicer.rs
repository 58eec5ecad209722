// ============================================================
// Layer 4 — Slice Builder
// ============================================================
// Tiles a volume's spatial extent with fixed-size patches.
//
// Per axis of size i, with patch k and stride s:
//   starts = 0, s, 2s, ... while start + k <= i
//   plus i - k when the last patch stops short of the end
//
// so every voxel is covered and every patch has the same size.
// A patch larger than the axis is clamped to the whole axis.
//
// Example, one axis of 10 with patch 4 and stride 3:
//   starts 0, 3, 6 (6 + 4 = 10, already at the end)
// and with stride 4:
//   starts 0, 4, then 6 to reach the end

use crate::domain::volume::{PatchIndex, Shape3};

/// Patch and stride shapes from `loaders.slice_builder`.
#[derive(Debug, Clone, Copy)]
pub struct SliceBuilder {
    patch:  Shape3,
    stride: Shape3,
}

impl SliceBuilder {
    pub fn new(patch: Shape3, stride: Shape3) -> Self {
        Self { patch, stride }
    }

    /// Patch size actually used for a volume of this extent.
    pub fn effective_patch(&self, spatial: Shape3) -> Shape3 {
        [0, 1, 2].map(|a| self.patch[a].min(spatial[a]))
    }

    /// Every patch box for a volume of this extent, z-major order.
    pub fn build(&self, spatial: Shape3) -> Vec<PatchIndex> {
        let size   = self.effective_patch(spatial);
        let starts = [0, 1, 2].map(|a| axis_starts(spatial[a], size[a], self.stride[a]));

        let mut out = Vec::with_capacity(starts.iter().map(Vec::len).product());
        for &z in &starts[0] {
            for &y in &starts[1] {
                for &x in &starts[2] {
                    out.push(PatchIndex { start: [z, y, x], size });
                }
            }
        }
        out
    }
}

/// Start offsets along one axis; empty for an empty axis.
fn axis_starts(len: usize, patch: usize, stride: usize) -> Vec<usize> {
    if len == 0 || patch == 0 {
        return Vec::new();
    }
    let stride     = stride.max(1);
    let mut starts: Vec<usize> = (0..=len - patch).step_by(stride).collect();
    if let Some(&last) = starts.last() {
        if last + patch < len {
            starts.push(len - patch);
        }
    }
    starts
}

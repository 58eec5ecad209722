// ============================================================
// Layer 3 — Volume Domain Types
// ============================================================
// Plain channel-first voxel buffers. No burn types here:
//
//   Volume         — [C, D, H, W] f32 data, row-major
//   PatchIndex     — a box inside the spatial extent [D, H, W]
//   PredictionMap  — accumulates overlapping patch predictions
//                    and averages them per voxel

use anyhow::{bail, Result};

/// Spatial extent of a volume or patch: [depth, height, width].
pub type Shape3 = [usize; 3];

#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    channels: usize,
    spatial:  Shape3,
    data:     Vec<f32>,
}

impl Volume {
    pub fn new(channels: usize, spatial: Shape3, data: Vec<f32>) -> Result<Self> {
        let expected = channels * voxel_count(spatial);
        if data.len() != expected {
            bail!(
                "volume [{channels}, {}, {}, {}] needs {expected} values, got {}",
                spatial[0], spatial[1], spatial[2], data.len()
            );
        }
        Ok(Self { channels, spatial, data })
    }

    pub fn zeros(channels: usize, spatial: Shape3) -> Self {
        Self { channels, spatial, data: vec![0.0; channels * voxel_count(spatial)] }
    }

    pub fn channels(&self) -> usize  { self.channels }
    pub fn spatial(&self) -> Shape3  { self.spatial }
    pub fn data(&self) -> &[f32]     { &self.data }

    /// Full shape as stored on disk: [C, D, H, W].
    pub fn shape(&self) -> [usize; 4] {
        [self.channels, self.spatial[0], self.spatial[1], self.spatial[2]]
    }

    /// Copy the voxels under `index`, all channels, into a fresh
    /// [C, d, h, w] buffer.
    pub fn extract(&self, index: &PatchIndex) -> Vec<f32> {
        let [d, h, w]    = index.size;
        let [z0, y0, x0] = index.start;
        let [_, vh, vw]  = self.spatial;
        let plane        = voxel_count(self.spatial);

        let mut out = Vec::with_capacity(self.channels * d * h * w);
        for c in 0..self.channels {
            for z in z0..z0 + d {
                for y in y0..y0 + h {
                    let row = c * plane + (z * vh + y) * vw + x0;
                    out.extend_from_slice(&self.data[row..row + w]);
                }
            }
        }
        out
    }

    /// Per-voxel argmax over channels, as a single-channel volume of labels.
    pub fn argmax_channels(&self) -> Volume {
        let plane  = voxel_count(self.spatial);
        let labels = (0..plane)
            .map(|v| {
                let mut best = 0usize;
                for c in 1..self.channels {
                    if self.data[c * plane + v] > self.data[best * plane + v] {
                        best = c;
                    }
                }
                best as f32
            })
            .collect();
        Volume { channels: 1, spatial: self.spatial, data: labels }
    }
}

/// Axis-aligned box in voxel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchIndex {
    pub start: Shape3,
    pub size:  Shape3,
}

impl PatchIndex {
    pub fn voxels(&self) -> usize { voxel_count(self.size) }
}

pub fn voxel_count(shape: Shape3) -> usize {
    shape.iter().product()
}

/// Mirror a channel-first [C, d, h, w] buffer along one spatial axis
/// (0 = z, 1 = y, 2 = x). Applying it twice restores the input.
pub fn flip_axis(data: &[f32], channels: usize, size: Shape3, axis: usize) -> Vec<f32> {
    let [d, h, w] = size;
    let mut out   = vec![0.0; data.len()];
    for c in 0..channels {
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    let (fz, fy, fx) = match axis {
                        0 => (d - 1 - z, y, x),
                        1 => (z, h - 1 - y, x),
                        _ => (z, y, w - 1 - x),
                    };
                    let src = ((c * d + z) * h + y) * w + x;
                    let dst = ((c * d + fz) * h + fy) * w + fx;
                    out[dst] = data[src];
                }
            }
        }
    }
    out
}

// ─── PredictionMap ────────────────────────────────────────────────────────────
/// Running sum of patch predictions plus a per-voxel visit count.
/// `finish` divides one by the other; voxels no patch covered stay 0.
#[derive(Debug, Clone)]
pub struct PredictionMap {
    sum:    Volume,
    counts: Vec<u32>,
}

impl PredictionMap {
    pub fn new(channels: usize, spatial: Shape3) -> Self {
        Self {
            sum:    Volume::zeros(channels, spatial),
            counts: vec![0; voxel_count(spatial)],
        }
    }

    /// Add a [C, d, h, w] prediction for `index`.
    pub fn add_patch(&mut self, index: &PatchIndex, values: &[f32]) -> Result<()> {
        let channels = self.sum.channels;
        if values.len() != channels * index.voxels() {
            bail!(
                "patch at {:?} expects {} values, got {}",
                index.start, channels * index.voxels(), values.len()
            );
        }

        let [d, h, w]    = index.size;
        let [z0, y0, x0] = index.start;
        let [_, vh, vw]  = self.sum.spatial;
        let plane        = self.counts.len();

        let mut src = 0;
        for c in 0..channels {
            for z in z0..z0 + d {
                for y in y0..y0 + h {
                    let row = (z * vh + y) * vw + x0;
                    for x in 0..w {
                        self.sum.data[c * plane + row + x] += values[src];
                        if c == 0 {
                            self.counts[row + x] += 1;
                        }
                        src += 1;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Volume {
        let plane   = self.counts.len();
        let counts  = self.counts;
        let mut sum = self.sum;
        for (i, v) in sum.data.iter_mut().enumerate() {
            let n = counts[i % plane];
            if n > 0 {
                *v /= n as f32;
            }
        }
        sum
    }
}

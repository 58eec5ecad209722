// ============================================================
// Layer 4 — Patch Dataset
// ============================================================
// Burn's Dataset trait over the patch boxes of one volume. The
// volume is shared through an Arc with the TestLoader that owns
// it; each `get` copies one patch out.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

use burn::data::dataset::Dataset;
use std::sync::Arc;

use crate::domain::volume::{PatchIndex, Volume};

/// One patch cut from a volume: where it came from and its voxels,
/// channel-first [C, d, h, w].
#[derive(Debug, Clone)]
pub struct PatchItem {
    pub index: PatchIndex,
    pub data:  Vec<f32>,
}

/// The patches of a single volume. Voxels are copied out lazily on `get`.
pub struct PatchDataset {
    volume:  Arc<Volume>,
    indices: Vec<PatchIndex>,
}

impl PatchDataset {
    /// `indices` must all lie inside `volume`.
    pub fn new(volume: Arc<Volume>, indices: Vec<PatchIndex>) -> Self {
        Self { volume, indices }
    }
}

impl Dataset<PatchItem> for PatchDataset {
    fn get(&self, index: usize) -> Option<PatchItem> {
        self.indices.get(index).map(|idx| PatchItem {
            index: *idx,
            data:  self.volume.extract(idx),
        })
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

// ============================================================
// Layer 4 — Patch Batcher
// ============================================================
// Stacks equally sized patches into one input tensor
//
//   N × [C, d, h, w]  →  Tensor [N, C, d, h, w]
//
// and keeps each patch's box so predictions can be written back
// to the right place.
//
// Burn's own Batcher trait is built for multi-worker DataLoaders.
// Inference walks one volume in order, so a plain method is enough.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

use burn::prelude::*;

use crate::data::dataset::PatchItem;
use crate::domain::volume::PatchIndex;

/// A stacked batch plus where each of its patches came from.
#[derive(Debug, Clone)]
pub struct PatchBatch<B: Backend> {
    /// [N, C, d, h, w] on the batcher's device
    pub inputs:  Tensor<B, 5>,
    /// Patch boxes in the same order as the batch dimension
    pub indices: Vec<PatchIndex>,
}

/// Builds `PatchBatch`es on one device for volumes of one channel count.
#[derive(Clone, Debug)]
pub struct PatchBatcher<B: Backend> {
    device:   B::Device,
    channels: usize,
}

impl<B: Backend> PatchBatcher<B> {
    /// `channels` must match the volume the patches are cut from.
    pub fn new(device: B::Device, channels: usize) -> Self {
        Self { device, channels }
    }

    /// `items` must be non-empty and share one patch size.
    pub fn batch(&self, items: Vec<PatchItem>) -> PatchBatch<B> {
        let [d, h, w] = items[0].index.size;
        let n         = items.len();

        let mut flat    = Vec::with_capacity(n * self.channels * d * h * w);
        let mut indices = Vec::with_capacity(n);
        for item in items {
            flat.extend_from_slice(&item.data);
            indices.push(item.index);
        }

        let inputs = Tensor::<B, 5>::from_data(
            TensorData::new(flat, [n, self.channels, d, h, w]),
            &self.device,
        );
        PatchBatch { inputs, indices }
    }
}

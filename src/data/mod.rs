// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From stored volume files to device-ready patch batches:
//
//   volume file (.safetensors)
//       │
//       ▼
//   TestLoader        → reads the raw volume, owns it for one dataset
//       │
//       ▼
//   SliceBuilder      → tiles the spatial extent into patch boxes
//       │
//       ▼
//   PatchDataset      → implements Burn's Dataset trait over the boxes
//       │
//       ▼
//   PatchBatcher      → stacks patches into [B, C, D, H, W] tensors

/// Volume discovery and the per-dataset loader
pub mod loader;

/// Sliding-window patch tiling
pub mod slicer;

/// Implements Burn's Dataset trait for patches of one volume
pub mod dataset;

/// Stacks patches into tensor batches
pub mod batcher;

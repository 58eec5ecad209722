// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
//   checkpoint.rs — model weights through Burn's CompactRecorder
//   artifact.rs   — safetensors volume containers, read and write

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Volume container reading and prediction artifact writing
pub mod artifact;

// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network code lives here.
//
//   model.rs      — UNet3D / ResidualUNet3D topology and its
//                   final activation
//
//   device.rs     — device identifiers from the config and
//                   verified placement of a restored model
//
//   predictor/    — the registry of prediction strategies and
//                   the strategies themselves

/// 3D U-Net architecture
pub mod model;

/// Device parsing and model placement
pub mod device;

/// Prediction strategies and their registry
pub mod predictor;

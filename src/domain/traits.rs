// ============================================================
// Layer 3 — Core Traits
// ============================================================

use anyhow::Result;

// ─── Predictor ────────────────────────────────────────────────────────────────
/// One prediction strategy bound to one input volume.
///
/// A predictor is built fresh for every volume and consumed by its
/// single `execute` call, which writes the whole prediction artifact
/// to the output path it was constructed with. The model it borrows
/// must be treated as read-only.
///
/// Implementations:
///   - StandardPredictor     → sliding window, overlaps averaged
///   - WholeVolumePredictor  → one forward pass over the full volume
///   - UncertaintyPredictor  → mirrored test-time augmentation, mean + std
pub trait Predictor {
    /// Registered strategy name, used in logs and artifact metadata.
    fn name(&self) -> &'static str;

    /// Predict the entire volume and write the artifact.
    fn execute(self: Box<Self>) -> Result<()>;
}

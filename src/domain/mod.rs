// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types shared by every other layer. No burn types,
// no file I/O.

// Failure taxonomy of a prediction run
pub mod error;

// Output artifact path and container naming rules
pub mod naming;

// Voxel buffers, patch boxes and the prediction accumulator
pub mod volume;

// The Predictor abstraction every strategy implements
pub mod traits;

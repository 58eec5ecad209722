// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor math, no file formats.
//
//   config.rs            — the YAML run configuration and its checks
//   predict_use_case.rs  — restore, place, then predict each volume

pub mod config;

pub mod predict_use_case;

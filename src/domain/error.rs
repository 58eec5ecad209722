// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure that can end a prediction run. All of them are
// fatal at the orchestrator level: nothing is retried and no
// partially written artifact is cleaned up.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed opaque cause, used where a predictor or loader fails internally.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a run stopped.
#[derive(Error, Debug)]
pub enum PredictError {
    /// The YAML did not parse, or a value failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No checkpoint file at the normalised `model_path`
    #[error("checkpoint not found at '{}'", path.display())]
    CheckpointNotFound { path: PathBuf },

    /// The file exists but does not decode, or does not fit the model
    #[error("checkpoint '{}' is incompatible with the model: {reason}", path.display())]
    CheckpointCorrupt { path: PathBuf, reason: String },

    /// The target cannot allocate, or the model did not fully move there
    #[error("device '{device}' is unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("unknown predictor strategy '{name}' (registered: {})", registered.join(", "))]
    UnknownPredictorStrategy { name: String, registered: Vec<String> },

    #[error("invalid options for predictor '{name}': {reason}")]
    InvalidPredictorOptions { name: String, reason: String },

    /// A volume in the loader sequence could not be read
    #[error("cannot load dataset '{}': {source}", path.display())]
    DatasetLoad {
        path:   PathBuf,
        #[source]
        source: BoxedCause,
    },

    #[error("predictor failed on '{}': {source}", source_path.display())]
    PredictorExecution {
        source_path: PathBuf,
        #[source]
        source:      BoxedCause,
    },
}

impl PredictError {
    /// Wrap an opaque loader failure for `path`.
    pub fn dataset_load(path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        PredictError::DatasetLoad { path: path.into(), source: err.into() }
    }

    /// Wrap an opaque failure raised inside a predictor's `execute`.
    pub fn execution(source_path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        PredictError::PredictorExecution { source_path: source_path.into(), source: err.into() }
    }
}

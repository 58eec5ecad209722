// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// The YAML file passed with --config, deserialised once into a
// typed Config and validated before anything else happens:
//
//   model_path: checkpoints/best
//   device: cpu
//   model:
//     name: UNet3D
//     out_channels: 2
//   predictor:
//     name: StandardPredictor
//     save_segmentation: true
//   dest_dataset_name: segmentation
//   loaders:
//     test_paths: [data/test]
//     slice_builder:
//       patch_shape:  [32, 64, 64]
//       stride_shape: [16, 32, 32]

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};

use crate::domain::error::PredictError;
use crate::domain::naming::DatasetNames;
use crate::ml::device::DeviceSpec;
use crate::ml::model::ModelKind;

/// Strategy used when `predictor.name` is absent.
pub const DEFAULT_PREDICTOR: &str = "StandardPredictor";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Checkpoint written by burn's CompactRecorder
    pub model_path: PathBuf,

    /// Compute target: cpu, gpu, cuda, wgpu, gpu:N, cuda:N
    pub device: String,

    pub model: ModelSection,

    #[serde(default)]
    pub predictor: PredictorSection,

    /// Explicit names for the containers written into each artifact
    #[serde(default)]
    pub dest_dataset_name: Option<DatasetNames>,

    pub loaders: LoadersSection,
}

/// Network topology; must match the one the checkpoint was saved from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    /// UNet3D or ResidualUNet3D
    #[serde(default = "default_model_name")]
    pub name:          String,
    #[serde(default = "default_in_channels")]
    pub in_channels:   usize,
    pub out_channels:  usize,
    #[serde(default = "default_f_maps")]
    pub f_maps:        usize,
    #[serde(default = "default_num_levels")]
    pub num_levels:    usize,
    /// true → sigmoid per channel, false → softmax across channels
    #[serde(default = "default_true")]
    pub final_sigmoid: bool,
}

/// Strategy name plus whatever else sits next to it in the YAML.
/// The extra keys are handed to the chosen strategy untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorSection {
    #[serde(default = "default_predictor_name")]
    pub name:    String,
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

impl Default for PredictorSection {
    fn default() -> Self {
        Self { name: default_predictor_name(), options: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadersSection {
    /// Volume files or directories of volume files, in processing order
    pub test_paths:        Vec<PathBuf>,
    /// Name of the input array inside each volume file
    #[serde(default = "default_raw_internal_path")]
    pub raw_internal_path: String,
    #[serde(default = "default_batch_size")]
    pub batch_size:        usize,
    pub slice_builder:     SliceBuilderSection,
}

/// Sliding-window geometry, [z, y, x]. Stride may not exceed patch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SliceBuilderSection {
    pub patch_shape:  [usize; 3],
    pub stride_shape: [usize; 3],
}

fn default_model_name() -> String        { "UNet3D".to_string() }
fn default_predictor_name() -> String    { DEFAULT_PREDICTOR.to_string() }
fn default_raw_internal_path() -> String { "raw".to_string() }
fn default_in_channels() -> usize        { 1 }
fn default_f_maps() -> usize             { 16 }
fn default_num_levels() -> usize         { 3 }
fn default_batch_size() -> usize         { 1 }
fn default_true() -> bool                { true }

impl Config {
    /// Read, parse and validate the YAML file at `path`.
    pub fn load(path: &Path) -> Result<Self, PredictError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PredictError::InvalidConfig(format!("cannot read '{}': {e}", path.display()))
        })?;
        tracing::debug!("Loaded config file '{}'", path.display());
        Self::from_yaml(&text)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, PredictError> {
        let config: Config = serde_yaml::from_str(text)
            .map_err(|e| PredictError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PredictError> {
        let invalid = |msg: String| Err(PredictError::InvalidConfig(msg));

        if self.model_path.as_os_str().is_empty() {
            return invalid("model_path must not be empty".into());
        }
        DeviceSpec::parse(&self.device)?;

        let m = &self.model;
        ModelKind::from_name(&m.name)?;
        if m.in_channels == 0 || m.out_channels == 0 || m.f_maps == 0 || m.num_levels == 0 {
            return invalid(
                "model in_channels, out_channels, f_maps and num_levels must be positive".into(),
            );
        }

        if self.predictor.name.trim().is_empty() {
            return invalid("predictor name must not be empty".into());
        }

        if let Some(DatasetNames::Many(names)) = &self.dest_dataset_name {
            if names.is_empty() {
                return invalid("dest_dataset_name list must not be empty".into());
            }
        }

        let l = &self.loaders;
        if l.test_paths.is_empty() {
            return invalid("loaders.test_paths must list at least one path".into());
        }
        if l.batch_size == 0 {
            return invalid("loaders.batch_size must be at least 1".into());
        }
        let sb = &l.slice_builder;
        for axis in 0..3 {
            let (k, s) = (sb.patch_shape[axis], sb.stride_shape[axis]);
            if k == 0 || s == 0 {
                return invalid(format!("slice_builder shapes must be positive (axis {axis})"));
            }
            if s > k {
                return invalid(format!(
                    "slice_builder stride {s} exceeds patch {k} on axis {axis}; voxels would be skipped"
                ));
            }
        }
        Ok(())
    }
}

// ============================================================
// Layer 5 — Predictor Registry
// ============================================================
// Strategy names map to factory functions, filled in at start:
//
//   "StandardPredictor"     → standard::build
//   "WholeVolumePredictor"  → whole_volume::build
//   "UncertaintyPredictor"  → uncertainty::build
//
// Every factory receives the same PredictorArgs. The registry
// does nothing per strategy beyond the lookup; an unknown name
// fails before any factory runs.
//
// Adding a strategy:
//   1. write a module with `pub const NAME` and a `build` factory
//   2. register it in `with_builtin` (or on a registry at runtime)
//
// Reference: Rust Book §17 (Trait Objects)

pub mod standard;
pub mod uncertainty;
pub mod whole_volume;

use anyhow::{bail, Result};
use burn::prelude::*;
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, path::PathBuf};

use crate::application::config::Config;
use crate::data::loader::TestLoader;
use crate::domain::{
    error::PredictError,
    naming::resolve_dataset_names,
    traits::Predictor,
    volume::Volume,
};
use crate::infra::artifact::ArtifactWriter;
use crate::ml::model::UNet3d;

/// Strategy-specific keys from the `predictor` config section.
pub type PredictorOptions = BTreeMap<String, serde_yaml::Value>;

/// Everything a strategy is constructed from.
pub struct PredictorArgs<'a, B: Backend> {
    /// Restored, placed model. Read-only for the predictor.
    pub model:       &'a UNet3d<B>,
    pub loader:      TestLoader,
    pub output_path: PathBuf,
    pub config:      &'a Config,
    pub options:     &'a PredictorOptions,
}

/// Constructs one strategy from its arguments.
///
/// A plain function pointer, generic over the borrow so the built
/// predictor can hold the model and config for as long as they live.
/// Option errors are reported here, before anything is predicted.
pub type PredictorFactory<B> =
    for<'a> fn(PredictorArgs<'a, B>) -> Result<Box<dyn Predictor + 'a>, PredictError>;

/// Strategy names mapped to their factories.
///
/// Lookup is exact and case-sensitive. Names are kept sorted so error
/// messages and `names()` are stable.
pub struct PredictorRegistry<B: Backend> {
    /// Name → factory; one entry per strategy
    factories: BTreeMap<String, PredictorFactory<B>>,
}

impl<B: Backend> PredictorRegistry<B> {
    /// A registry with no strategies.
    ///
    /// Every `create` call fails until something is registered.
    pub fn empty() -> Self {
        Self { factories: BTreeMap::new() }
    }

    /// A registry holding every built-in strategy:
    /// StandardPredictor, WholeVolumePredictor and UncertaintyPredictor.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(standard::NAME, standard::build::<B>);
        registry.register(whole_volume::NAME, whole_volume::build::<B>);
        registry.register(uncertainty::NAME, uncertainty::build::<B>);
        registry
    }

    /// Add or replace a strategy; returns the factory it replaced.
    ///
    /// Registering under a built-in name overrides that built-in.
    pub fn register(
        &mut self,
        name:    impl Into<String>,
        factory: PredictorFactory<B>,
    ) -> Option<PredictorFactory<B>> {
        self.factories.insert(name.into(), factory)
    }

    /// Registered strategy names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Resolve `name` and construct that strategy from `args`.
    ///
    /// Fails with `UnknownPredictorStrategy`, listing every registered
    /// name, when `name` is not registered; `args` is dropped unused.
    /// Otherwise returns whatever the factory returns.
    pub fn create<'a>(
        &self,
        name: &str,
        args: PredictorArgs<'a, B>,
    ) -> Result<Box<dyn Predictor + 'a>, PredictError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            PredictError::UnknownPredictorStrategy { name: name.to_string(), registered: self.names() }
        })?;
        factory(args)
    }
}

/// Same as `with_builtin`.
impl<B: Backend> Default for PredictorRegistry<B> {
    fn default() -> Self {
        Self::with_builtin()
    }
}

// ─── Helpers shared by the strategies ─────────────────────────────────────────

/// Deserialize a strategy's own option struct from the config keys.
pub fn parse_options<T: DeserializeOwned>(
    strategy: &str,
    options:  &PredictorOptions,
) -> Result<T, PredictError> {
    let mapping: serde_yaml::Mapping = options
        .iter()
        .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.clone()))
        .collect();
    serde_yaml::from_value(serde_yaml::Value::Mapping(mapping)).map_err(|e| {
        PredictError::InvalidPredictorOptions { name: strategy.to_string(), reason: e.to_string() }
    })
}

/// The volume must carry as many channels as the model consumes.
pub fn check_channels<B: Backend>(model: &UNet3d<B>, volume: &Volume) -> Result<()> {
    if volume.channels() != model.in_channels() {
        bail!(
            "volume has {} channel(s) but the model expects {}",
            volume.channels(),
            model.in_channels()
        );
    }
    Ok(())
}

/// Run the model with its final activation and pull the result back
/// to the host, flattened batch-first.
pub fn predict_values<B: Backend>(model: &UNet3d<B>, inputs: Tensor<B, 5>) -> Result<Vec<f32>> {
    model
        .predict(inputs)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("cannot read prediction back from device: {e:?}"))
}

/// Name the output volumes and write them, with run metadata, to the
/// predictor's output path.
pub fn write_artifact<B: Backend>(
    args:     &PredictorArgs<'_, B>,
    strategy: &str,
    outputs:  Vec<Volume>,
) -> Result<()> {
    let names = resolve_dataset_names(args.config.dest_dataset_name.as_ref(), outputs.len());
    if names.len() != outputs.len() {
        bail!(
            "{strategy} produces {} output(s) but dest_dataset_name names {}",
            outputs.len(),
            names.len()
        );
    }

    let options_json = serde_json::to_string(args.options)?;
    ArtifactWriter::new(&args.output_path)
        .with_metadata("source_path", args.loader.source_path().display().to_string())
        .with_metadata("model_path", args.config.model_path.display().to_string())
        .with_metadata("predictor", strategy)
        .with_metadata("predictor_options", options_json)
        .write(&names.into_iter().zip(outputs).collect::<Vec<_>>())
}


// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_builtin_names() {
        let registry = PredictorRegistry::<TestBackend>::with_builtin();
        assert_eq!(
            registry.names(),
            vec!["StandardPredictor", "UncertaintyPredictor", "WholeVolumePredictor"]
        );
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let cfg      = config("");
        let model    = model();
        let options  = PredictorOptions::new();
        let registry = PredictorRegistry::<TestBackend>::with_builtin();
        let args = PredictorArgs {
            model:       &model,
            loader:      loader("v.safetensors".as_ref(), [2, 4, 4], [2, 4, 4]),
            output_path: "v_predictions.safetensors".into(),
            config:      &cfg,
            options:     &options,
        };

        match registry.create("MagicPredictor", args) {
            Err(PredictError::UnknownPredictorStrategy { name, registered }) => {
                assert_eq!(name, "MagicPredictor");
                assert_eq!(registered.len(), 3);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_)      => panic!("unknown strategy was constructed"),
        };
    }

    #[test]
    fn test_parse_options_reports_strategy() {
        let mut options = PredictorOptions::new();
        options.insert("flip_axes".into(), serde_yaml::Value::String("all".into()));
        let err = parse_options::<uncertainty::UncertaintyOptions>("UncertaintyPredictor", &options)
            .unwrap_err();
        assert!(matches!(err, PredictError::InvalidPredictorOptions { .. }));
    }

    #[test]
    fn test_channel_mismatch() {
        let volume = Volume::zeros(2, [1, 1, 1]);
        assert!(check_channels(&model(), &volume).is_err());
    }
}

// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Runs one prediction job, strictly in this order:
//
//   Initializing        probe the device, build the model topology
//                       on it, discover volumes
//   Restoring           load the checkpoint, then place on device
//   ProcessingDatasets  for each volume, in order:
//                         derive output path → dispatch predictor
//                         → execute → log
//   Done
//
// Any failure moves the run to Aborted and is returned as is.
// There is no retry, no skipping of a failed volume and no
// cleanup: artifacts written for earlier volumes stay on disk.
//
// The device is probed before the first allocation on it. A GPU
// backend without an adapter panics on allocation, so an absent
// device is reported as DeviceUnavailable from Initializing when
// running from the config, or from Restoring when a caller hands
// in a ready topology.
//
// Reference: Rust Book §9 (Error Handling)

use burn::prelude::*;
use std::path::PathBuf;

use crate::application::config::Config;
use crate::data::loader::{test_loaders, TestLoader};
use crate::domain::{error::PredictError, naming::derive_output_path};
use crate::infra::checkpoint::CheckpointStore;
use crate::ml::{
    device::{check_device, place_on_device},
    model::{build_model, UNet3d},
    predictor::{PredictorArgs, PredictorRegistry},
};

/// Where a run is. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Restoring,
    ProcessingDatasets,
    Done,
    Aborted,
}

/// What a finished run produced, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outputs: Vec<PathBuf>,
}

/// One prediction job over every configured volume.
///
/// The use case owns the model for the whole run and lends it to
/// each predictor in turn; predictors never outlive their volume.
pub struct PredictUseCase<'c, B: Backend> {
    /// Validated run configuration
    config:   &'c Config,
    /// Target the model is restored onto and runs on
    device:   B::Device,
    /// Strategies the `predictor.name` key is resolved against
    registry: PredictorRegistry<B>,
    state:    RunState,
}

impl<'c, B: Backend> PredictUseCase<'c, B> {
    /// A use case with every built-in predictor registered.
    pub fn new(config: &'c Config, device: B::Device) -> Self {
        Self::with_registry(config, device, PredictorRegistry::with_builtin())
    }

    /// A use case resolving strategies against `registry` only.
    pub fn with_registry(config: &'c Config, device: B::Device, registry: PredictorRegistry<B>) -> Self {
        Self { config, device, registry, state: RunState::Initializing }
    }

    /// Current state; `Aborted` after any returned error.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Full run driven by the config: model from `model`, volumes
    /// from `loaders`, weights from `model_path`.
    pub fn run(&mut self) -> Result<RunSummary, PredictError> {
        let config = self.config;
        let device = self.device.clone();
        check_device::<B>(&device).map_err(|e| self.abort(e))?;

        let model = build_model::<B>(&config.model, &device).map_err(|e| self.abort(e))?;
        let loaders = test_loaders(&config.loaders).map_err(|e| self.abort(e))?;
        self.execute(model, loaders)
    }

    /// Restore `model`, place it, then predict every loader in order.
    ///
    /// `loaders` is consumed once. A loader that fails to open, or a
    /// predictor that fails, stops the run at that position.
    pub fn execute<I>(&mut self, model: UNet3d<B>, loaders: I) -> Result<RunSummary, PredictError>
    where
        I: IntoIterator<Item = Result<TestLoader, PredictError>>,
    {
        let model = self.restore(model)?;

        self.state = RunState::ProcessingDatasets;
        let config   = self.config;
        let strategy = config.predictor.name.as_str();
        let options  = &config.predictor.options;
        let mut summary = RunSummary::default();

        tracing::info!("Loading datasets...");
        for loader in loaders {
            let loader = loader.map_err(|e| self.abort(e))?;
            let source = loader.source_path().to_path_buf();
            tracing::info!("Processing '{}'...", source.display());

            let output_path = derive_output_path(&source);
            let args = PredictorArgs {
                model:       &model,
                loader,
                output_path: output_path.clone(),
                config,
                options,
            };
            let predictor = self.registry.create(strategy, args).map_err(|e| self.abort(e))?;
            tracing::debug!("Using {} for '{}'", predictor.name(), source.display());

            predictor
                .execute()
                .map_err(|e| self.abort(PredictError::execution(&source, e)))?;

            tracing::info!("Saved predictions to '{}'", output_path.display());
            summary.outputs.push(output_path);
        }

        self.state = RunState::Done;
        tracing::info!("Finished {} dataset(s)", summary.outputs.len());
        Ok(summary)
    }

    fn restore(&mut self, model: UNet3d<B>) -> Result<UNet3d<B>, PredictError> {
        self.state = RunState::Restoring;
        let config = self.config;
        let device = self.device.clone();

        // The record is decoded straight onto the target.
        check_device::<B>(&device).map_err(|e| self.abort(e))?;

        tracing::info!("Loading model from {}...", config.model_path.display());
        let model = CheckpointStore::new(&config.model_path)
            .restore(model, &device)
            .map_err(|e| self.abort(e))?;

        tracing::info!("Sending the model to '{}'", config.device);
        place_on_device::<B, _>(model, &device).map_err(|e| self.abort(e))
    }

    /// Log the failing stage, then move to `Aborted`.
    fn abort(&mut self, err: PredictError) -> PredictError {
        tracing::error!("Run aborted while {:?}: {err}", self.state);
        self.state = RunState::Aborted;
        err
    }
}

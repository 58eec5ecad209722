// ============================================================
// Layer 5 — WholeVolumePredictor
// ============================================================
// A single forward pass over the entire volume; the loader's
// patch settings are ignored. Fits volumes small enough for the
// device's memory and avoids any seams between patches.

use anyhow::Result;
use burn::prelude::*;

use super::{check_channels, predict_values, write_artifact, PredictorArgs};
use crate::data::{batcher::PatchBatcher, dataset::PatchItem};
use crate::domain::{
    error::PredictError,
    traits::Predictor,
    volume::{PatchIndex, Volume},
};

/// Registry key for this strategy.
pub const NAME: &str = "WholeVolumePredictor";

/// Built per volume by `build`, consumed by `execute`.
pub struct WholeVolumePredictor<'a, B: Backend> {
    args: PredictorArgs<'a, B>,
}

/// Registry factory: parse and check the options, then wrap `args`.
pub fn build<'a, B: Backend>(
    args: PredictorArgs<'a, B>,
) -> Result<Box<dyn Predictor + 'a>, PredictError> {
    Ok(Box::new(WholeVolumePredictor { args }))
}

impl<'a, B: Backend> Predictor for WholeVolumePredictor<'a, B> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn execute(self: Box<Self>) -> Result<()> {
        let args   = self.args;
        let model  = args.model;
        let volume = args.loader.volume();
        check_channels(model, volume)?;

        let spatial = volume.spatial();
        let item    = PatchItem {
            index: PatchIndex { start: [0, 0, 0], size: spatial },
            data:  volume.data().to_vec(),
        };
        let batch = PatchBatcher::<B>::new(model.device(), volume.channels()).batch(vec![item]);
        tracing::debug!("Predicting whole volume {:?}", volume.shape());

        let values     = predict_values(model, batch.inputs)?;
        let prediction = Volume::new(model.out_channels(), spatial, values)?;
        write_artifact(&args, NAME, vec![prediction])
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::infra::artifact::read_volume;
    use crate::ml::predictor::{standard, PredictorOptions};

    #[test]
    fn test_matches_sliding_window_with_a_single_full_patch() -> Result<()> {
        let tmp     = tempfile::tempdir()?;
        let cfg     = config("");
        let model   = model();
        let options = PredictorOptions::new();
        let source  = tmp.path().join("v.safetensors");

        let whole_out = tmp.path().join("whole.safetensors");
        build(PredictorArgs {
            model:       &model,
            loader:      loader(&source, [2, 2, 2], [1, 1, 1]),
            output_path: whole_out.clone(),
            config:      &cfg,
            options:     &options,
        })?
        .execute()?;

        let window_out = tmp.path().join("window.safetensors");
        standard::build(PredictorArgs {
            model:       &model,
            loader:      loader(&source, [4, 6, 6], [4, 6, 6]),
            output_path: window_out.clone(),
            config:      &cfg,
            options:     &options,
        })?
        .execute()?;

        let whole  = read_volume(&whole_out, "predictions")?;
        let window = read_volume(&window_out, "predictions")?;
        assert_eq!(whole.shape(), [2, 4, 6, 6]);
        for (a, b) in whole.data().iter().zip(window.data()) {
            assert!((a - b).abs() < 1e-5);
        }
        Ok(())
    }
}

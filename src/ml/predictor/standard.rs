// ============================================================
// Layer 5 — StandardPredictor
// ============================================================
// Sliding window: every patch from the loader is predicted and
// added into a PredictionMap, so voxels covered by several
// overlapping patches end up with the mean of those predictions.
//
// Options:
//   save_segmentation: bool (default false)
//     store per-voxel argmax labels instead of probabilities

use anyhow::Result;
use burn::{data::dataset::Dataset, prelude::*};
use serde::Deserialize;

use super::{check_channels, parse_options, predict_values, write_artifact, PredictorArgs};
use crate::data::batcher::PatchBatcher;
use crate::domain::{error::PredictError, traits::Predictor, volume::PredictionMap};

/// Registry key for this strategy.
pub const NAME: &str = "StandardPredictor";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Options read from the `predictor` section.
pub struct StandardOptions {
    /// Store argmax labels (one channel) instead of probabilities
    pub save_segmentation: bool,
}

/// Built per volume by `build`, consumed by `execute`.
pub struct StandardPredictor<'a, B: Backend> {
    args:    PredictorArgs<'a, B>,
    options: StandardOptions,
}

/// Registry factory: parse and check the options, then wrap `args`.
pub fn build<'a, B: Backend>(
    args: PredictorArgs<'a, B>,
) -> Result<Box<dyn Predictor + 'a>, PredictError> {
    let options = parse_options(NAME, args.options)?;
    Ok(Box::new(StandardPredictor { args, options }))
}

impl<'a, B: Backend> Predictor for StandardPredictor<'a, B> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn execute(self: Box<Self>) -> Result<()> {
        let StandardPredictor { args, options } = *self;
        let model  = args.model;
        let volume = args.loader.volume();
        check_channels(model, volume)?;

        let batcher = PatchBatcher::<B>::new(model.device(), volume.channels());
        let mut map = PredictionMap::new(model.out_channels(), volume.spatial());
        let total   = args.loader.patches().len();
        let mut done = 0usize;

        for items in args.loader.batches() {
            let batch  = batcher.batch(items);
            let values = predict_values(model, batch.inputs)?;
            let per    = (values.len() / batch.indices.len()).max(1);
            for (index, chunk) in batch.indices.iter().zip(values.chunks_exact(per)) {
                map.add_patch(index, chunk)?;
            }
            done += batch.indices.len();
            tracing::debug!("Predicted {done}/{total} patches");
        }

        let mut prediction = map.finish();
        if options.save_segmentation {
            prediction = prediction.argmax_channels();
        }
        write_artifact(&args, NAME, vec![prediction])
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::infra::artifact::{read_artifact_index, read_volume};
    use crate::ml::predictor::PredictorOptions;

    fn run(extra_config: &str, options: PredictorOptions, patch: [usize; 3], stride: [usize; 3])
        -> Result<crate::domain::volume::Volume>
    {
        let tmp    = tempfile::tempdir()?;
        let output = tmp.path().join("v_predictions.safetensors");
        let cfg    = config(extra_config);
        let model  = model();
        let args = PredictorArgs {
            model:       &model,
            loader:      loader(&tmp.path().join("v.safetensors"), patch, stride),
            output_path: output.clone(),
            config:      &cfg,
            options:     &options,
        };
        build(args)?.execute()?;

        let (names, meta) = read_artifact_index(&output)?;
        assert_eq!(meta.get("predictor").map(String::as_str), Some(NAME));
        read_volume(&output, &names[0])
    }

    #[test]
    fn test_writes_probabilities_for_every_voxel() -> Result<()> {
        let out = run("", PredictorOptions::new(), [2, 4, 4], [1, 2, 2])?;
        assert_eq!(out.shape(), [2, 4, 6, 6]);
        assert!(out.data().iter().all(|v| *v > 0.0 && *v < 1.0));
        Ok(())
    }

    #[test]
    fn test_segmentation_stores_labels() -> Result<()> {
        let mut options = PredictorOptions::new();
        options.insert("save_segmentation".into(), serde_yaml::Value::Bool(true));
        let out = run("", options, [2, 4, 4], [2, 2, 2])?;
        assert_eq!(out.shape(), [1, 4, 6, 6]);
        assert!(out.data().iter().all(|v| *v == 0.0 || *v == 1.0));
        Ok(())
    }

    #[test]
    fn test_explicit_dataset_name_is_used() -> Result<()> {
        let tmp    = tempfile::tempdir()?;
        let output = tmp.path().join("out.safetensors");
        let cfg    = config("dest_dataset_name: probs\n");
        let model  = model();
        let options = PredictorOptions::new();
        let args = PredictorArgs {
            model:       &model,
            loader:      loader(&tmp.path().join("v.safetensors"), [4, 6, 6], [4, 6, 6]),
            output_path: output.clone(),
            config:      &cfg,
            options:     &options,
        };
        build(args)?.execute()?;
        assert_eq!(read_artifact_index(&output)?.0, vec!["probs"]);
        Ok(())
    }
}

// ============================================================
// Layer 5 — UncertaintyPredictor
// ============================================================
// Test-time augmentation over the sliding window. Each batch is
// predicted as-is and once mirrored along every axis listed in
// `flip_axes`; mirrored predictions are flipped back before they
// are accumulated. Two volumes are written:
//
//   0: per-voxel mean over all augmentations and overlapping patches
//   1: per-voxel standard deviation over the same samples
//
// Options:
//   flip_axes: [usize] (default [0, 1, 2]; 0 = z, 1 = y, 2 = x)

use anyhow::Result;
use burn::prelude::*;
use serde::Deserialize;

use super::{check_channels, parse_options, predict_values, write_artifact, PredictorArgs};
use crate::data::{batcher::PatchBatcher, dataset::PatchItem};
use crate::domain::{
    error::PredictError,
    traits::Predictor,
    volume::{flip_axis, PredictionMap, Volume},
};

/// Registry key for this strategy.
pub const NAME: &str = "UncertaintyPredictor";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Options read from the `predictor` section.
pub struct UncertaintyOptions {
    /// Spatial axes to mirror along, one extra pass per entry
    pub flip_axes: Vec<usize>,
}

impl Default for UncertaintyOptions {
    fn default() -> Self {
        Self { flip_axes: vec![0, 1, 2] }
    }
}

/// Built per volume by `build`, consumed by `execute`.
pub struct UncertaintyPredictor<'a, B: Backend> {
    args:    PredictorArgs<'a, B>,
    options: UncertaintyOptions,
}

/// Registry factory: parse and check the options, then wrap `args`.
pub fn build<'a, B: Backend>(
    args: PredictorArgs<'a, B>,
) -> Result<Box<dyn Predictor + 'a>, PredictError> {
    let options: UncertaintyOptions = parse_options(NAME, args.options)?;
    if let Some(bad) = options.flip_axes.iter().find(|&&a| a > 2) {
        return Err(PredictError::InvalidPredictorOptions {
            name:   NAME.to_string(),
            reason: format!("flip axis {bad} is not a spatial axis (0, 1 or 2)"),
        });
    }
    Ok(Box::new(UncertaintyPredictor { args, options }))
}

impl<'a, B: Backend> Predictor for UncertaintyPredictor<'a, B> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn execute(self: Box<Self>) -> Result<()> {
        let UncertaintyPredictor { args, options } = *self;
        let model  = args.model;
        let volume = args.loader.volume();
        check_channels(model, volume)?;

        let (in_c, out_c) = (volume.channels(), model.out_channels());
        let augmentations: Vec<Option<usize>> = std::iter::once(None)
            .chain(options.flip_axes.iter().copied().map(Some))
            .collect();

        let batcher     = PatchBatcher::<B>::new(model.device(), in_c);
        let mut sum     = PredictionMap::new(out_c, volume.spatial());
        let mut squares = PredictionMap::new(out_c, volume.spatial());

        for items in args.loader.batches() {
            for &aug in &augmentations {
                let inputs: Vec<PatchItem> = items
                    .iter()
                    .map(|item| match aug {
                        None       => item.clone(),
                        Some(axis) => PatchItem {
                            index: item.index,
                            data:  flip_axis(&item.data, in_c, item.index.size, axis),
                        },
                    })
                    .collect();

                let batch  = batcher.batch(inputs);
                let values = predict_values(model, batch.inputs)?;
                let per    = (values.len() / batch.indices.len()).max(1);

                for (index, chunk) in batch.indices.iter().zip(values.chunks_exact(per)) {
                    let restored = match aug {
                        None       => chunk.to_vec(),
                        Some(axis) => flip_axis(chunk, out_c, index.size, axis),
                    };
                    let sq: Vec<f32> = restored.iter().map(|v| v * v).collect();
                    sum.add_patch(index, &restored)?;
                    squares.add_patch(index, &sq)?;
                }
            }
        }
        tracing::debug!("Accumulated {} augmentation(s) per patch", augmentations.len());

        let mean    = sum.finish();
        let mean_sq = squares.finish();
        let std     = mean
            .data()
            .iter()
            .zip(mean_sq.data())
            .map(|(m, q)| (q - m * m).max(0.0).sqrt())
            .collect();
        let std = Volume::new(out_c, mean.spatial(), std)?;

        write_artifact(&args, NAME, vec![mean, std])
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::infra::artifact::{read_artifact_index, read_volume};
    use crate::ml::predictor::PredictorOptions;

    #[test]
    fn test_writes_mean_and_std_with_indexed_names() -> Result<()> {
        let tmp     = tempfile::tempdir()?;
        let output  = tmp.path().join("v_predictions.safetensors");
        let cfg     = config("");
        let model   = model();
        let options = PredictorOptions::new();
        build(PredictorArgs {
            model:       &model,
            loader:      loader(&tmp.path().join("v.safetensors"), [2, 4, 4], [2, 2, 2]),
            output_path: output.clone(),
            config:      &cfg,
            options:     &options,
        })?
        .execute()?;

        assert_eq!(read_artifact_index(&output)?.0, vec!["predictions0", "predictions1"]);
        let mean = read_volume(&output, "predictions0")?;
        let std  = read_volume(&output, "predictions1")?;
        assert_eq!(mean.shape(), std.shape());
        assert!(mean.data().iter().all(|v| *v > 0.0 && *v < 1.0));
        assert!(std.data().iter().all(|v| *v >= 0.0 && *v < 0.5));
        Ok(())
    }

    #[test]
    fn test_no_flips_means_zero_spread_without_overlap() -> Result<()> {
        let tmp    = tempfile::tempdir()?;
        let output = tmp.path().join("out.safetensors");
        let cfg    = config("dest_dataset_name: [mean, std]\n");
        let model  = model();
        let mut options = PredictorOptions::new();
        options.insert("flip_axes".into(), serde_yaml::from_str("[]")?);
        build(PredictorArgs {
            model:       &model,
            loader:      loader(&tmp.path().join("v.safetensors"), [2, 6, 6], [2, 6, 6]),
            output_path: output.clone(),
            config:      &cfg,
            options:     &options,
        })?
        .execute()?;

        let std = read_volume(&output, "std")?;
        assert!(std.data().iter().all(|v| v.abs() < 1e-3));
        Ok(())
    }

    #[test]
    fn test_rejects_non_spatial_axis() {
        let cfg     = config("");
        let model   = model();
        let mut options = PredictorOptions::new();
        options.insert("flip_axes".into(), serde_yaml::from_str("[3]").unwrap());
        let result = build(PredictorArgs {
            model:       &model,
            loader:      loader("v.safetensors".as_ref(), [2, 4, 4], [2, 4, 4]),
            output_path: "unused.safetensors".into(),
            config:      &cfg,
            options:     &options,
        });
        assert!(matches!(result, Err(PredictError::InvalidPredictorOptions { .. })));
    }
}

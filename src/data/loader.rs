// ============================================================
// Layer 4 — Test Volume Loaders
// ============================================================
// Turns `loaders.test_paths` into a lazy, single-pass sequence of
// TestLoaders, one per volume file:
//
//   test_paths ──discover──► [a.safetensors, b.safetensors, ...]
//                                │ (read when the sequence gets there)
//                                ▼
//                           TestLoader ──batches()──► Vec<PatchItem>
//
// Directories contribute their *.safetensors files sorted by name.
// Discovery runs once up front; a volume that fails to read shows
// up as an Err at its position in the sequence.

use anyhow::Context;
use burn::data::dataset::Dataset;
use std::{fs, path::{Path, PathBuf}, sync::Arc};

use crate::application::config::LoadersSection;
use crate::data::{
    dataset::{PatchDataset, PatchItem},
    slicer::SliceBuilder,
};
use crate::domain::{error::PredictError, naming::OUTPUT_EXTENSION, volume::Volume};
use crate::infra::artifact::read_volume;

/// One input volume, ready to be predicted.
pub struct TestLoader {
    source_path: PathBuf,
    volume:      Arc<Volume>,
    patches:     PatchDataset,
    batch_size:  usize,
}

impl TestLoader {
    pub fn new(
        source_path: impl Into<PathBuf>,
        volume:      Volume,
        slicer:      SliceBuilder,
        batch_size:  usize,
    ) -> Self {
        let volume  = Arc::new(volume);
        let indices = slicer.build(volume.spatial());
        Self {
            source_path: source_path.into(),
            patches:     PatchDataset::new(Arc::clone(&volume), indices),
            volume,
            batch_size:  batch_size.max(1),
        }
    }

    /// Read the volume at `path` using the loader settings from the config.
    pub fn open(path: &Path, cfg: &LoadersSection) -> Result<Self, PredictError> {
        let volume = read_volume(path, &cfg.raw_internal_path)
            .map_err(|e| PredictError::dataset_load(path, e))?;
        let sb     = cfg.slice_builder;
        Ok(Self::new(
            path,
            volume,
            SliceBuilder::new(sb.patch_shape, sb.stride_shape),
            cfg.batch_size,
        ))
    }

    pub fn source_path(&self) -> &Path  { &self.source_path }
    pub fn volume(&self) -> &Volume     { &self.volume }
    pub fn patches(&self) -> &PatchDataset { &self.patches }

    /// Patches in order, grouped into batches of at most `batch_size`.
    pub fn batches(&self) -> impl Iterator<Item = Vec<PatchItem>> + '_ {
        let total = self.patches.len();
        (0..total).step_by(self.batch_size).map(move |start| {
            (start..(start + self.batch_size).min(total))
                .filter_map(|i| self.patches.get(i))
                .collect()
        })
    }
}

/// Expand files and directories into the ordered list of volume files.
pub fn discover_volumes(paths: &[PathBuf]) -> Result<Vec<PathBuf>, PredictError> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut files = list_volume_files(path)
                .map_err(|e| PredictError::dataset_load(path, e))?;
            if files.is_empty() {
                tracing::warn!("No .{OUTPUT_EXTENSION} files in '{}'", path.display());
            }
            files.sort();
            found.extend(files);
        } else if path.is_file() {
            found.push(path.clone());
        } else {
            return Err(PredictError::dataset_load(
                path,
                anyhow::anyhow!("no such file or directory"),
            ));
        }
    }
    Ok(found)
}

fn list_volume_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(OUTPUT_EXTENSION) {
            files.push(path);
        }
    }
    Ok(files)
}

/// The lazy loader sequence for a run. Each element reads its volume
/// only when the iterator reaches it.
pub fn test_loaders(
    cfg: &LoadersSection,
) -> Result<impl Iterator<Item = Result<TestLoader, PredictError>> + '_, PredictError> {
    let files = discover_volumes(&cfg.test_paths)?;
    tracing::info!("Found {} test volume(s)", files.len());
    Ok(files.into_iter().map(move |path| TestLoader::open(&path, cfg)))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::SliceBuilderSection;
    use crate::infra::artifact::ArtifactWriter;

    fn loaders_cfg(paths: Vec<PathBuf>) -> LoadersSection {
        LoadersSection {
            test_paths:        paths,
            raw_internal_path: "raw".into(),
            batch_size:        3,
            slice_builder:     SliceBuilderSection { patch_shape: [2, 2, 2], stride_shape: [2, 2, 2] },
        }
    }

    fn write_volume(path: &Path) {
        ArtifactWriter::new(path)
            .write(&[("raw".to_string(), Volume::zeros(1, [4, 4, 2]))])
            .unwrap();
    }

    #[test]
    fn test_batches_respect_batch_size() {
        let loader = TestLoader::new(
            "v.safetensors",
            Volume::zeros(1, [4, 4, 2]),
            SliceBuilder::new([2, 2, 2], [2, 2, 2]),
            3,
        );
        let sizes: Vec<usize> = loader.batches().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 1]);
    }

    #[test]
    fn test_directory_expands_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        write_volume(&tmp.path().join("b.safetensors"));
        write_volume(&tmp.path().join("a.safetensors"));
        fs::write(tmp.path().join("notes.txt"), "skip me").unwrap();

        let found = discover_volumes(&[tmp.path().to_path_buf()]).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.safetensors", "b.safetensors"]);
    }

    #[test]
    fn test_missing_path_fails_discovery() {
        let err = discover_volumes(&[PathBuf::from("/nonexistent/vol.safetensors")]).unwrap_err();
        assert!(matches!(err, PredictError::DatasetLoad { .. }));
    }

    #[test]
    fn test_volumes_are_read_lazily() {
        let tmp  = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.safetensors");
        let bad  = tmp.path().join("bad.safetensors");
        write_volume(&good);
        fs::write(&bad, b"not a volume").unwrap();

        let cfg     = loaders_cfg(vec![good.clone(), bad]);
        let mut seq = test_loaders(&cfg).unwrap();

        let first = seq.next().unwrap().unwrap();
        assert_eq!(first.source_path(), good.as_path());
        assert_eq!(first.patches().len(), 4);
        assert!(matches!(seq.next(), Some(Err(PredictError::DatasetLoad { .. }))));
        assert!(seq.next().is_none());
    }
}

// ============================================================
// Layer 6 — Volume Files (safetensors)
// ============================================================
// Input volumes and prediction artifacts share one container
// format: a safetensors file holding named n-d arrays plus a
// string metadata map.
//
//   read_volume     — one named array → Volume [C, D, H, W]
//   ArtifactWriter  — several named Volumes → one file
//
// Accepted input dtypes: F32, F64, U8, U16, I32 (converted to f32).
// A 3-D array is read as a single-channel volume.
//
// Outputs are always written as little-endian F32, shaped
// [C, D, H, W], with the run metadata in the file header.
//
// Reference: safetensors format (huggingface/safetensors)

use anyhow::{bail, Context, Result};
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use std::{collections::HashMap, fs, path::{Path, PathBuf}};

use crate::domain::volume::Volume;

/// Read the array called `name` from the safetensors file at `path`.
pub fn read_volume(path: &Path, name: &str) -> Result<Volume> {
    let bytes = fs::read(path)
        .with_context(|| format!("cannot read '{}'", path.display()))?;
    let file = SafeTensors::deserialize(&bytes)
        .map_err(|e| anyhow::anyhow!("'{}' is not a safetensors file: {e:?}", path.display()))?;

    let view = file.tensor(name).map_err(|_| {
        let mut available: Vec<&str> = file.names().into_iter().map(|n| n.as_str()).collect();
        available.sort_unstable();
        anyhow::anyhow!(
            "'{}' has no array named '{name}' (found: {})",
            path.display(),
            available.join(", ")
        )
    })?;

    let (channels, spatial) = match *view.shape() {
        [d, h, w]    => (1, [d, h, w]),
        [c, d, h, w] => (c, [d, h, w]),
        ref other    => bail!("array '{name}' must be 3-D or 4-D, found shape {other:?}"),
    };
    Volume::new(channels, spatial, decode_f32(&view)?)
        .with_context(|| format!("array '{name}' in '{}'", path.display()))
}

/// Convert the raw little-endian bytes of `view` to f32.
fn decode_f32(view: &TensorView<'_>) -> Result<Vec<f32>> {
    let raw = view.data();
    let values = match view.dtype() {
        Dtype::F32 => raw.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Dtype::F64 => raw.chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
        Dtype::U8  => raw.iter().map(|&b| b as f32).collect(),
        Dtype::U16 => raw.chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32)
            .collect(),
        Dtype::I32 => raw.chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
            .collect(),
        other => bail!("unsupported dtype {other:?}"),
    };
    Ok(values)
}

// ─── ArtifactWriter ───────────────────────────────────────────────────────────
/// Collects named volumes and metadata, then writes them in one go.
pub struct ArtifactWriter {
    path:     PathBuf,
    metadata: HashMap<String, String>,
}

impl ArtifactWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), metadata: HashMap::new() }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Write every `(name, volume)` pair as an F32 [C, D, H, W] array.
    pub fn write(self, volumes: &[(String, Volume)]) -> Result<()> {
        if volumes.is_empty() {
            bail!("refusing to write '{}' with no arrays", self.path.display());
        }

        let encoded: Vec<(String, [usize; 4], Vec<u8>)> = volumes
            .iter()
            .map(|(name, vol)| {
                let bytes = vol.data().iter().flat_map(|v| v.to_le_bytes()).collect();
                (name.clone(), vol.shape(), bytes)
            })
            .collect();

        let mut views = Vec::with_capacity(encoded.len());
        for (name, shape, bytes) in &encoded {
            let view = TensorView::new(Dtype::F32, shape.to_vec(), bytes)
                .map_err(|e| anyhow::anyhow!("array '{name}': {e:?}"))?;
            views.push((name.as_str(), view));
        }

        let metadata = (!self.metadata.is_empty()).then_some(self.metadata);
        safetensors::serialize_to_file(views, &metadata, &self.path)
            .map_err(|e| anyhow::anyhow!("cannot write '{}': {e:?}", self.path.display()))?;
        tracing::debug!("Wrote {} array(s) to '{}'", volumes.len(), self.path.display());
        Ok(())
    }
}

/// Names and metadata of an existing artifact, for inspection.
pub fn read_artifact_index(path: &Path) -> Result<(Vec<String>, HashMap<String, String>)> {
    let bytes = fs::read(path)
        .with_context(|| format!("cannot read '{}'", path.display()))?;
    let (_, header) = SafeTensors::read_metadata(&bytes)
        .map_err(|e| anyhow::anyhow!("'{}' is not a safetensors file: {e:?}", path.display()))?;
    let mut names: Vec<String> = header.tensors().into_keys().collect();
    names.sort_unstable();
    let metadata = header.metadata().clone().unwrap_or_default();
    Ok((names, metadata))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_volume_reads_back() -> Result<()> {
        let tmp  = tempfile::tempdir()?;
        let path = tmp.path().join("vol.safetensors");
        let vol  = Volume::new(2, [1, 2, 2], (0..8).map(|i| i as f32 * 0.5).collect())?;

        ArtifactWriter::new(&path)
            .with_metadata("source_path", "in.safetensors")
            .write(&[("raw".to_string(), vol.clone())])?;

        assert_eq!(read_volume(&path, "raw")?, vol);
        let (names, meta) = read_artifact_index(&path)?;
        assert_eq!(names, vec!["raw"]);
        assert_eq!(meta.get("source_path").map(String::as_str), Some("in.safetensors"));
        Ok(())
    }

    #[test]
    fn test_three_dimensional_u8_input() -> Result<()> {
        let tmp   = tempfile::tempdir()?;
        let path  = tmp.path().join("labels.safetensors");
        let bytes = vec![0u8, 1, 2, 255];
        let view  = TensorView::new(Dtype::U8, vec![1, 2, 2], &bytes)
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        safetensors::serialize_to_file(vec![("raw", view)], &None, &path)
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;

        let vol = read_volume(&path, "raw")?;
        assert_eq!(vol.shape(), [1, 1, 2, 2]);
        assert_eq!(vol.data(), &[0.0, 1.0, 2.0, 255.0]);
        Ok(())
    }

    #[test]
    fn test_missing_array_names_alternatives() -> Result<()> {
        let tmp  = tempfile::tempdir()?;
        let path = tmp.path().join("vol.safetensors");
        ArtifactWriter::new(&path).write(&[("image".to_string(), Volume::zeros(1, [1, 1, 1]))])?;

        let err = read_volume(&path, "raw").unwrap_err().to_string();
        assert!(err.contains("'raw'") && err.contains("image"), "{err}");
        Ok(())
    }

    #[test]
    fn test_not_a_safetensors_file() -> Result<()> {
        let tmp  = tempfile::tempdir()?;
        let path = tmp.path().join("junk.safetensors");
        fs::write(&path, b"xx")?;
        assert!(read_volume(&path, "raw").is_err());
        Ok(())
    }
}

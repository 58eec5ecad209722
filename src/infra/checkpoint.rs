// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Saves and restores UNet3d weights with burn's CompactRecorder
// (named MessagePack, half precision). The recorder always
// replaces the extension of the configured path with `.mpk`:
//
//   model_path: checkpoints/best      → checkpoints/best.mpk
//   model_path: checkpoints/best.mpk  → checkpoints/best.mpk
//
// Restoring is all or nothing. A missing file and a record that
// does not fit the model are both reported before the model is
// handed back:
//
//   file absent                      → CheckpointNotFound
//   bytes that do not decode         → CheckpointCorrupt
//   block counts / shortcuts differ  → CheckpointCorrupt (checked
//                                      before burn sees the record)
//   tensor shapes differ             → CheckpointCorrupt (parameter
//                                      count changes after loading)
//
// Reference: Burn Book §5 (Records and Checkpointing)

use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder, RecorderError},
};
use std::{
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use crate::domain::error::PredictError;
use crate::ml::{
    device::panic_message,
    model::{UNet3d, UNet3dRecord},
};

/// Extension CompactRecorder writes and reads.
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// Reads and writes the weights of one UNet3d at a fixed location.
pub struct CheckpointStore {
    /// Location from the config; the extension is normalised on use
    path: PathBuf,
}

impl CheckpointStore {
    /// Nothing touches the disk until `save` or `restore`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file the recorder actually touches.
    pub fn file_path(&self) -> PathBuf {
        self.path.with_extension(CHECKPOINT_EXTENSION)
    }

    /// Write every parameter of `model`, creating parent directories.
    pub fn save<B: Backend>(&self, model: &UNet3d<B>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        CompactRecorder::new()
            .record(model.clone().into_record(), self.path.clone())
            .map_err(|e| {
                anyhow::anyhow!("cannot save checkpoint to '{}': {e:?}", self.file_path().display())
            })?;
        tracing::debug!("Saved checkpoint '{}'", self.file_path().display());
        Ok(())
    }

    /// Load the stored parameters into `model`, decoding them onto
    /// `device`. The untouched topology is consumed either way.
    pub fn restore<B: Backend>(
        &self,
        model:  UNet3d<B>,
        device: &B::Device,
    ) -> Result<UNet3d<B>, PredictError> {
        let file = self.file_path();
        if !file.is_file() {
            return Err(PredictError::CheckpointNotFound { path: file });
        }

        let record = CompactRecorder::new()
            .load(self.path.clone(), device)
            .map_err(|e| match e {
                RecorderError::FileNotFound(_) => PredictError::CheckpointNotFound { path: file.clone() },
                other => corrupt(&file, format!("{other:?}")),
            })?;

        check_layout(&model, &record).map_err(|reason| corrupt(&file, reason))?;

        // burn asserts on any remaining structural mismatch.
        let expected = model.num_params();
        let restored = panic::catch_unwind(AssertUnwindSafe(move || model.load_record(record)))
            .map_err(|payload| corrupt(&file, panic_message(payload.as_ref())))?;
        let found    = restored.num_params();
        if found != expected {
            return Err(corrupt(
                &file,
                format!("record holds {found} parameters, model expects {expected}"),
            ));
        }
        Ok(restored)
    }
}

/// Compare the record's block structure with the model's: the number
/// of encoder, downsampling and decoder blocks, and which blocks carry
/// a residual shortcut.
fn check_layout<B: Backend>(model: &UNet3d<B>, record: &UNet3dRecord<B>) -> Result<(), String> {
    let counts = [
        ("encoder", model.encoders.len(), record.encoders.len()),
        ("downsampling", model.downsamplers.len(), record.downsamplers.len()),
        ("decoder", model.decoders.len(), record.decoders.len()),
    ];
    for (what, expected, found) in counts {
        if found != expected {
            return Err(format!("record holds {found} {what} block(s), model expects {expected}"));
        }
    }

    let blocks  = model.encoders.iter().chain(&model.decoders);
    let records = record.encoders.iter().chain(&record.decoders);
    for (i, (block, rec)) in blocks.zip(records).enumerate() {
        if block.shortcut.is_some() != rec.shortcut.is_some() {
            return Err(format!("block {i}: residual shortcut present in only one of record and model"));
        }
    }
    Ok(())
}

fn corrupt(path: &Path, reason: String) -> PredictError {
    PredictError::CheckpointCorrupt { path: path.to_path_buf(), reason }
}

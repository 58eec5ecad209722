// ============================================================
// Layer 3 — Output Naming
// ============================================================
// Two pure functions decide where predictions go:
//
//   derive_output_path     — input volume path → artifact path
//   resolve_dataset_names  — how the containers inside that
//                            artifact are named
//
// Neither touches the filesystem.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Appended to the input stem. Never empty, so an artifact can
/// never share a path with its source volume.
pub const OUTPUT_SUFFIX: &str = "_predictions";

/// Extension of every artifact (safetensors container).
pub const OUTPUT_EXTENSION: &str = "safetensors";

/// Container name used when the config does not name them.
pub const DEFAULT_DATASET_NAME: &str = "predictions";

/// `dest_dataset_name` as written in the config: one name or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasetNames {
    Single(String),
    Many(Vec<String>),
}

/// Strip the extension of `source` and append the suffix plus the
/// artifact extension. A path without an extension is all stem.
///
///   data/a.h5            → data/a_predictions.safetensors
///   data/vol.safetensors → data/vol_predictions.safetensors
///   data/raw             → data/raw_predictions.safetensors
pub fn derive_output_path(source: &Path) -> PathBuf {
    let mut out = source.with_extension("").into_os_string();
    out.push(OUTPUT_SUFFIX);
    out.push(".");
    out.push(OUTPUT_EXTENSION);
    PathBuf::from(out)
}

/// Names of the `count` containers a predictor writes for one volume.
///
/// Explicit names always win: a single string becomes a one-element
/// list and a list is returned unchanged, whatever `count` is. Without
/// explicit names a single output is called `predictions` and several
/// are numbered `predictions0 .. predictions{count-1}`.
pub fn resolve_dataset_names(explicit: Option<&DatasetNames>, count: usize) -> Vec<String> {
    match explicit {
        Some(DatasetNames::Single(name)) => vec![name.clone()],
        Some(DatasetNames::Many(names))  => names.clone(),
        None if count == 1 => vec![DEFAULT_DATASET_NAME.to_string()],
        None => (0..count)
            .map(|i| format!("{DEFAULT_DATASET_NAME}{i}"))
            .collect(),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_replaces_extension() {
        assert_eq!(
            derive_output_path(Path::new("data/a.h5")),
            PathBuf::from("data/a_predictions.safetensors")
        );
        assert_eq!(
            derive_output_path(Path::new("b.safetensors")),
            PathBuf::from("b_predictions.safetensors")
        );
    }

    #[test]
    fn test_output_path_only_strips_last_extension() {
        assert_eq!(
            derive_output_path(Path::new("/tmp/scan.v2.h5")),
            PathBuf::from("/tmp/scan.v2_predictions.safetensors")
        );
    }

    #[test]
    fn test_output_path_without_extension_uses_whole_path() {
        assert_eq!(
            derive_output_path(Path::new("volumes/raw")),
            PathBuf::from("volumes/raw_predictions.safetensors")
        );
    }

    #[test]
    fn test_output_path_is_deterministic_and_never_the_source() {
        for p in ["a.safetensors", "x_predictions.safetensors", "dir/.hidden", "noext"] {
            let source = Path::new(p);
            let first  = derive_output_path(source);
            assert_eq!(first, derive_output_path(source));
            assert_ne!(first.as_path(), source);
        }
    }

    #[test]
    fn test_default_single_name() {
        assert_eq!(resolve_dataset_names(None, 1), vec!["predictions"]);
    }

    #[test]
    fn test_default_names_are_indexed() {
        assert_eq!(
            resolve_dataset_names(None, 3),
            vec!["predictions0", "predictions1", "predictions2"]
        );
    }

    #[test]
    fn test_explicit_string_ignores_count() {
        let names = DatasetNames::Single("foo".into());
        assert_eq!(resolve_dataset_names(Some(&names), 3), vec!["foo"]);
    }

    #[test]
    fn test_explicit_list_returned_unchanged() {
        let names = DatasetNames::Many(vec!["a".into(), "b".into()]);
        assert_eq!(resolve_dataset_names(Some(&names), 2), vec!["a", "b"]);
    }

    #[test]
    fn test_names_deserialize_from_string_or_list() {
        let single: DatasetNames = serde_yaml::from_str("seg").unwrap();
        let many:   DatasetNames = serde_yaml::from_str("[mean, std]").unwrap();
        assert_eq!(single, DatasetNames::Single("seg".into()));
        assert_eq!(many, DatasetNames::Many(vec!["mean".into(), "std".into()]));
    }
}

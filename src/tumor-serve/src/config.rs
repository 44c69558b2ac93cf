use std::env;
use std::path::PathBuf;

use log::debug;

use crate::error::Result;
use crate::labels::LabelSet;

/// Environment variable overriding the SavedModel export directory.
pub const MODEL_DIR_ENV: &str = "TUMOR_MODEL_DIR";

/// Environment variable pointing at an explicit labels file.
pub const LABELS_ENV: &str = "TUMOR_LABELS";

/// Labels file looked up inside the export directory when none is given.
pub const LABELS_FILE: &str = "labels.txt";

const MODEL_DIR_NAME: &str = "model";

/// Where to find the model and its labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    /// TensorFlow SavedModel export directory
    pub model_dir: PathBuf,

    /// Explicit labels file, overriding `<model_dir>/labels.txt`
    pub labels_path: Option<PathBuf>,
}

impl ServeConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        ServeConfig {
            model_dir: model_dir.into(),
            labels_path: None,
        }
    }

    pub fn with_labels(mut self, path: impl Into<PathBuf>) -> Self {
        self.labels_path = Some(path.into());
        self
    }

    /// Fill unset values with the defaults: `model/` next to the running
    /// executable, and the labels file inside it.
    pub fn resolve(model_dir: Option<PathBuf>, labels_path: Option<PathBuf>) -> Self {
        ServeConfig {
            model_dir: model_dir.unwrap_or_else(default_model_dir),
            labels_path,
        }
    }

    pub fn from_env() -> Self {
        ServeConfig::resolve(
            env::var_os(MODEL_DIR_ENV).map(PathBuf::from),
            env::var_os(LABELS_ENV).map(PathBuf::from),
        )
    }

    /// Load the label set: the explicit file if configured, otherwise
    /// `labels.txt` in the export directory, otherwise the built-in order.
    pub fn labels(&self) -> Result<LabelSet> {
        if let Some(path) = &self.labels_path {
            return LabelSet::from_file(path);
        }

        let bundled = self.model_dir.join(LABELS_FILE);
        if bundled.is_file() {
            debug!("Using labels from {}", bundled.display());
            return LabelSet::from_file(&bundled);
        }

        Ok(LabelSet::default())
    }
}

/// `model/` in the directory holding the running executable.
pub fn default_model_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(MODEL_DIR_NAME)))
        .unwrap_or_else(|| PathBuf::from(MODEL_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scratch_dir, scratch_file};

    #[test]
    fn resolve_defaults_next_to_executable() {
        let config = ServeConfig::resolve(None, None);
        assert!(config.model_dir.ends_with(MODEL_DIR_NAME));
        assert_eq!(config.labels_path, None);
    }

    #[test]
    fn builtin_labels_without_tags_file() {
        let config = ServeConfig::new("/nonexistent/model");
        assert_eq!(config.labels().unwrap(), LabelSet::default());
    }

    #[test]
    fn bundled_tags_file_is_picked_up() {
        let dir = scratch_dir();
        std::fs::write(dir.path().join(LABELS_FILE), "a\nb\n").unwrap();

        let labels = ServeConfig::new(dir.path()).labels().unwrap();
        assert_eq!(labels.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn explicit_tags_file_wins() {
        let dir = scratch_dir();
        std::fs::write(dir.path().join(LABELS_FILE), "a\nb\n").unwrap();
        let explicit = scratch_file("x\ny\nz\n");

        let labels = ServeConfig::new(dir.path())
            .with_labels(explicit.path())
            .labels()
            .unwrap();
        assert_eq!(labels.len(), 3);
    }
}

//! One-shot export of the trained model for use outside this process.
//!
//! The SavedModel graph (`saved_model.pb`) is copied together with the
//! `variables/` checkpoint holding the trained weights, plus a
//! `manifest.json` naming the interchange tensors `input` and `output`.
//! The batch dimension is always written as `-1` so consumers can feed any
//! batch size.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::labels::LabelSet;
use crate::model::{InferenceBackend, ModelSignature, SavedModel, TensorSpec, SERVE_TAG};
use crate::preprocess::{Layout, INPUT_SIZE};

/// Dimension value marking a dynamic axis.
pub const DYNAMIC_DIM: i64 = -1;

pub const SAVED_MODEL_FILE: &str = "saved_model.pb";
pub const VARIABLES_DIR: &str = "variables";
pub const ASSETS_DIR: &str = "assets";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedTensor {
    /// Interchange name consumers refer to
    pub name: String,

    /// Tensor name inside the graph
    pub tensor: String,

    pub shape: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportManifest {
    pub format: String,
    pub tags: Vec<String>,
    pub signature: String,
    pub graph: String,

    /// Checkpoint files holding the trained weights, relative to the export
    pub weights: Vec<String>,

    pub layout: Layout,
    pub input: ExportedTensor,
    pub output: ExportedTensor,
    pub labels: Vec<String>,
}

impl ExportManifest {
    pub fn new(signature: &ModelSignature, layout: Layout, labels: &LabelSet) -> Self {
        let input_fallback: Vec<i64> = layout
            .dims(INPUT_SIZE)
            .iter()
            .map(|&d| d as i64)
            .collect();
        let output_fallback = vec![1, labels.len() as i64];

        ExportManifest {
            format: "tensorflow-savedmodel".to_owned(),
            tags: vec![SERVE_TAG.to_owned()],
            signature: tensorflow::DEFAULT_SERVING_SIGNATURE_DEF_KEY.to_owned(),
            graph: SAVED_MODEL_FILE.to_owned(),
            weights: Vec::new(),
            layout,
            input: exported("input", &signature.input, &input_fallback),
            output: exported("output", &signature.output, &output_fallback),
            labels: labels.to_vec(),
        }
    }
}

fn exported(name: &str, spec: &TensorSpec, fallback: &[i64]) -> ExportedTensor {
    let mut shape: Vec<i64> = match &spec.dims {
        Some(dims) => dims.iter().map(|d| d.unwrap_or(DYNAMIC_DIM)).collect(),
        None => fallback.to_vec(),
    };

    if let Some(batch) = shape.first_mut() {
        *batch = DYNAMIC_DIM;
    }

    ExportedTensor {
        name: name.to_owned(),
        tensor: spec.tensor_name(),
        shape,
    }
}

/// Export the loaded model into the `output` directory.
/// Returns the manifest path.
pub fn export_saved_model(model: &SavedModel, labels: &LabelSet, output: &Path) -> Result<PathBuf> {
    let manifest = ExportManifest::new(model.signature(), model.layout(), labels);
    write_export(model.export_dir(), manifest, output)
}

/// Copy graph, weights and assets from the SavedModel in `source` into
/// `output` and write the manifest next to them.
pub fn write_export(source: &Path, mut manifest: ExportManifest, output: &Path) -> Result<PathBuf> {
    let graph = source.join(SAVED_MODEL_FILE);
    if !graph.is_file() {
        return Err(Error::Export(format!("{} not found", graph.display())));
    }

    let variables = source.join(VARIABLES_DIR);
    if !variables.is_dir() {
        return Err(Error::Export(format!(
            "{} not found, the trained weights live there",
            variables.display()
        )));
    }

    fs::create_dir_all(output)?;
    if fs::canonicalize(source)? == fs::canonicalize(output)? {
        return Err(Error::Export(
            "output directory must differ from the model directory".to_owned(),
        ));
    }

    fs::copy(&graph, output.join(SAVED_MODEL_FILE))?;

    manifest.weights = copy_dir(&variables, &output.join(VARIABLES_DIR), Path::new(VARIABLES_DIR))?;
    if manifest.weights.is_empty() {
        return Err(Error::Export(format!("{} is empty", variables.display())));
    }

    let assets = source.join(ASSETS_DIR);
    if assets.is_dir() {
        copy_dir(&assets, &output.join(ASSETS_DIR), Path::new(ASSETS_DIR))?;
    }

    let path = output.join(MANIFEST_FILE);
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;

    info!(
        "Exported {} weight files to {}",
        manifest.weights.len(),
        output.display()
    );

    Ok(path)
}

/// Recursively copy `from` into `to`, returning the copied file paths
/// prefixed with `relative`, in name order.
fn copy_dir(from: &Path, to: &Path, relative: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(to)?;

    let mut entries = fs::read_dir(from)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut copied = Vec::new();
    for entry in entries {
        let name = entry.file_name();
        let rel = relative.join(&name);

        if entry.file_type()?.is_dir() {
            copied.extend(copy_dir(&entry.path(), &to.join(&name), &rel)?);
        } else {
            fs::copy(entry.path(), to.join(&name))?;
            copied.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;

    fn signature(input: Option<Vec<Option<i64>>>, output: Option<Vec<Option<i64>>>) -> ModelSignature {
        ModelSignature {
            input: TensorSpec {
                name: "serving_default_input_1".to_owned(),
                index: 0,
                dims: input,
            },
            output: TensorSpec {
                name: "StatefulPartitionedCall".to_owned(),
                index: 0,
                dims: output,
            },
        }
    }

    fn manifest() -> ExportManifest {
        ExportManifest::new(&signature(None, None), Layout::Nhwc, &LabelSet::default())
    }

    /// Lay out a minimal SavedModel directory in `dir`.
    fn fake_saved_model(dir: &Path) {
        fs::write(dir.join(SAVED_MODEL_FILE), b"graph").unwrap();
        fs::create_dir_all(dir.join(VARIABLES_DIR)).unwrap();
        fs::write(
            dir.join(VARIABLES_DIR).join("variables.data-00000-of-00001"),
            b"trained weights",
        )
        .unwrap();
        fs::write(dir.join(VARIABLES_DIR).join("variables.index"), b"index").unwrap();
    }

    #[test]
    fn batch_dimension_is_dynamic() {
        let sig = signature(
            Some(vec![Some(1), Some(224), Some(224), Some(3)]),
            Some(vec![Some(1), Some(4)]),
        );
        let manifest = ExportManifest::new(&sig, Layout::Nhwc, &LabelSet::default());

        assert_eq!(manifest.input.name, "input");
        assert_eq!(manifest.input.tensor, "serving_default_input_1:0");
        assert_eq!(manifest.input.shape, vec![-1, 224, 224, 3]);
        assert_eq!(manifest.output.name, "output");
        assert_eq!(manifest.output.shape, vec![-1, 4]);
    }

    #[test]
    fn unknown_shapes_fall_back_to_layout() {
        let manifest =
            ExportManifest::new(&signature(None, None), Layout::Nchw, &LabelSet::default());
        assert_eq!(manifest.input.shape, vec![-1, 3, 224, 224]);
        assert_eq!(manifest.output.shape, vec![-1, 4]);
    }

    #[test]
    fn export_carries_the_trained_weights() {
        let source = scratch_dir();
        fake_saved_model(source.path());
        let target = scratch_dir();
        let output = target.path().join("export");

        let path = write_export(source.path(), manifest(), &output).unwrap();
        assert_eq!(path, output.join(MANIFEST_FILE));

        assert_eq!(fs::read(output.join(SAVED_MODEL_FILE)).unwrap(), b"graph");
        assert_eq!(
            fs::read(output.join(VARIABLES_DIR).join("variables.data-00000-of-00001")).unwrap(),
            b"trained weights"
        );

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["format"], "tensorflow-savedmodel");
        assert_eq!(json["graph"], SAVED_MODEL_FILE);
        assert_eq!(json["signature"], "serving_default");
        assert_eq!(
            json["weights"],
            serde_json::json!([
                "variables/variables.data-00000-of-00001",
                "variables/variables.index"
            ])
        );
        assert_eq!(json["layout"], "NHWC");
        assert_eq!(json["labels"][0], "no_tumor");
    }

    #[test]
    fn export_without_weights_fails() {
        let source = scratch_dir();
        fs::write(source.path().join(SAVED_MODEL_FILE), b"graph").unwrap();
        let target = scratch_dir();

        let err = write_export(source.path(), manifest(), target.path()).unwrap_err();
        assert!(matches!(err, Error::Export(_)));
        assert!(err.to_string().contains("trained weights"));
    }

    #[test]
    fn export_over_source_is_refused() {
        let source = scratch_dir();
        fake_saved_model(source.path());

        let err = write_export(source.path(), manifest(), source.path()).unwrap_err();
        assert!(matches!(err, Error::Export(_)));
        assert_eq!(
            fs::read(source.path().join(SAVED_MODEL_FILE)).unwrap(),
            b"graph"
        );
    }
}

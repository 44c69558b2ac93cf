use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tensorflow::{
    Graph, SavedModelBundle, Session, SessionOptions, SessionRunArgs, SignatureDef, Status,
    Tensor, TensorInfo, DEFAULT_SERVING_SIGNATURE_DEF_KEY,
};

use crate::error::{Error, Result};
use crate::preprocess::{ImageTensor, Layout, INPUT_SIZE};
use crate::timer::Timer;

/// MetaGraph tag of the serving graph inside the SavedModel.
pub const SERVE_TAG: &str = "serve";

/// Forward pass over a single preprocessed image.
///
/// Implementations must be inference-only: no state is mutated by `infer`,
/// so one instance can be shared by every request of the process.
pub trait InferenceBackend: Send + Sync {
    /// Tensor layout the backend expects its input in.
    fn layout(&self) -> Layout;

    /// Raw per-class scores (logits) for a batch of one.
    fn infer(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}

/// A graph tensor referenced by the serving signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    /// Operation name in the graph
    pub name: String,

    /// Output index of the operation
    pub index: i32,

    /// Static shape; `None` when the rank is unknown
    pub dims: Option<Vec<Option<i64>>>,
}

impl TensorSpec {
    fn from_info(info: &TensorInfo) -> Self {
        let shape = info.shape();

        TensorSpec {
            name: info.name().name.clone(),
            index: info.name().index,
            dims: shape.dims().map(|rank| (0..rank).map(|i| shape[i]).collect()),
        }
    }

    /// `op:index`, the usual way of naming a tensor in a graph.
    pub fn tensor_name(&self) -> String {
        format!("{}:{}", self.name, self.index)
    }
}

/// Input and output of the model's serving signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSignature {
    pub input: TensorSpec,
    pub output: TensorSpec,
}

impl ModelSignature {
    pub fn from_signature_def(signature: &SignatureDef) -> Result<Self> {
        Ok(ModelSignature {
            input: single_tensor(signature.inputs(), "input")?,
            output: single_tensor(signature.outputs(), "output")?,
        })
    }

    /// Work out the input layout from where the 3-channel axis sits.
    ///
    /// An input of unknown rank is assumed to be NHWC.
    pub fn layout(&self) -> Result<Layout> {
        let dims = match &self.input.dims {
            None => return Ok(Layout::Nhwc),
            Some(dims) => dims.as_slice(),
        };

        let (layout, spatial) = match dims {
            [_, h, w, Some(3)] => (Layout::Nhwc, [*h, *w]),
            [_, Some(3), h, w] => (Layout::Nchw, [*h, *w]),
            [_, h, w, None] => (Layout::Nhwc, [*h, *w]),
            _ => {
                return Err(Error::ModelLoad(format!(
                    "unsupported input shape {:?}, expected a rank 4 RGB image",
                    dims
                )))
            }
        };

        for side in spatial.iter().flatten() {
            if *side != i64::from(INPUT_SIZE) {
                return Err(Error::ModelLoad(format!(
                    "model expects {:?} input, images are resized to {}x{}",
                    dims, INPUT_SIZE, INPUT_SIZE
                )));
            }
        }

        Ok(layout)
    }

    /// Make sure the classification head has one output per label.
    pub fn check_classes(&self, num_classes: usize) -> Result<()> {
        let last = self
            .output
            .dims
            .as_ref()
            .and_then(|dims| dims.last().copied().flatten());

        match last {
            Some(n) if n != num_classes as i64 => Err(Error::ModelLoad(format!(
                "model has {} outputs but {} labels are configured",
                n, num_classes
            ))),
            _ => Ok(()),
        }
    }
}

fn single_tensor(tensors: &HashMap<String, TensorInfo>, kind: &str) -> Result<TensorSpec> {
    let mut iter = tensors.values();
    match (iter.next(), iter.next()) {
        (Some(info), None) => Ok(TensorSpec::from_info(info)),
        _ => Err(Error::ModelLoad(format!(
            "serving signature must have exactly one {}, found {}",
            kind,
            tensors.len()
        ))),
    }
}

/// ResNet-50 classifier exported as a TensorFlow SavedModel.
pub struct SavedModel {
    /// TensorFlow model graph
    graph: Graph,

    /// TensorFlow session
    session: Session,

    signature: ModelSignature,

    layout: Layout,

    export_dir: PathBuf,
}

impl SavedModel {
    /// Load the SavedModel in `export_dir` and check that its head emits
    /// exactly `num_classes` scores.
    pub fn load(export_dir: &Path, num_classes: usize) -> Result<Self> {
        let t = Timer::start("Loading session");

        if !export_dir.is_dir() {
            return Err(Error::ModelLoad(format!(
                "export directory {} does not exist",
                export_dir.display()
            )));
        }

        let mut graph = Graph::new();
        let bundle =
            SavedModelBundle::load(&SessionOptions::new(), &[SERVE_TAG], &mut graph, export_dir)
                .map_err(load_error)?;

        let signature = {
            let def = bundle
                .meta_graph_def()
                .get_signature(DEFAULT_SERVING_SIGNATURE_DEF_KEY)
                .map_err(load_error)?;
            ModelSignature::from_signature_def(def)?
        };

        signature.check_classes(num_classes)?;
        let layout = signature.layout()?;

        for spec in [&signature.input, &signature.output] {
            graph
                .operation_by_name_required(&spec.name)
                .map_err(load_error)?;
        }

        debug!(
            "Serving signature: {} -> {} ({:?})",
            signature.input.tensor_name(),
            signature.output.tensor_name(),
            layout
        );

        t.stop();
        info!("Loaded model from {}", export_dir.display());

        Ok(SavedModel {
            graph,
            session: bundle.session,
            signature,
            layout,
            export_dir: export_dir.to_path_buf(),
        })
    }

    pub fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    /// Directory the model was loaded from.
    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }
}

impl InferenceBackend for SavedModel {
    fn layout(&self) -> Layout {
        self.layout
    }

    fn infer(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let tensor = Tensor::<f32>::new(&input.dims()[..])
            .with_values(input.data())
            .map_err(run_error)?;

        let input_op = self
            .graph
            .operation_by_name_required(&self.signature.input.name)
            .map_err(run_error)?;
        let output_op = self
            .graph
            .operation_by_name_required(&self.signature.output.name)
            .map_err(run_error)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_op, self.signature.input.index, &tensor);
        let scores = args.request_fetch(&output_op, self.signature.output.index);

        self.session.run(&mut args).map_err(run_error)?;
        let output: Tensor<f32> = args.fetch(scores).map_err(run_error)?;

        Ok(output.to_vec())
    }
}

impl fmt::Debug for SavedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedModel")
            .field("signature", &self.signature)
            .field("layout", &self.layout)
            .field("export_dir", &self.export_dir)
            .finish()
    }
}

fn load_error(status: Status) -> Error {
    Error::ModelLoad(status.to_string())
}

fn run_error(status: Status) -> Error {
    Error::Processing(status.to_string())
}

/// Lifecycle of the model inside a process.
///
/// Both states are terminal: a failed load is reported on every request
/// instead of being retried.
pub enum ModelState {
    Loaded(Box<dyn InferenceBackend>),
    LoadFailed(String),
}

impl fmt::Debug for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelState::Loaded(_) => f.write_str("Loaded"),
            ModelState::LoadFailed(cause) => f.debug_tuple("LoadFailed").field(cause).finish(),
        }
    }
}

//! Brain MRI tumor classification on a TensorFlow SavedModel.
//!
//! A [`Predictor`] is built once per process from a [`ServeConfig`] and then
//! shared by the transport adapters (HTTP, serverless functions, CLI). Each
//! call runs the same linear pipeline: decode, preprocess, forward pass,
//! softmax, argmax.

pub mod config;
pub mod decode;
pub mod error;
pub mod export;
pub mod labels;
pub mod model;
pub mod predictor;
pub mod preprocess;
pub mod serverless;
mod timer;

#[cfg(test)]
mod test_support;

pub use config::ServeConfig;
pub use decode::{decode_base64, decode_image};
pub use error::{Error, Result};
pub use labels::{LabelSet, DEFAULT_LABELS};
pub use model::{InferenceBackend, ModelState, SavedModel};
pub use predictor::{ErrorBody, Outcome, Prediction, Predictor};
pub use preprocess::{preprocess, ImageTensor, Layout};
pub use timer::Timer;

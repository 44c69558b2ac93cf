use indexmap::IndexMap;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ServeConfig;
use crate::decode::decode_image;
use crate::error::{Error, Result};
use crate::labels::LabelSet;
use crate::model::{InferenceBackend, ModelState, SavedModel};
use crate::preprocess::{preprocess, Layout};
use crate::timer::Timer;

/// Outcome of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Label of the most probable class
    pub prediction: String,

    /// Index of that class in the label set
    pub class_id: usize,

    /// Probability of the winning class, in percent
    pub confidence: f64,

    /// Probability of every class, in percent, in label order
    pub all_probabilities: IndexMap<String, f64>,
}

/// `{"error": "..."}` body shared by every adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorBody {
            error: message.into(),
        }
    }
}

impl From<Error> for ErrorBody {
    fn from(err: Error) -> Self {
        ErrorBody::new(err.to_string())
    }
}

/// What gets written back to the caller: a full prediction or an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Prediction(Prediction),
    Error(ErrorBody),
}

impl From<Result<Prediction>> for Outcome {
    fn from(result: Result<Prediction>) -> Self {
        match result {
            Ok(prediction) => Outcome::Prediction(prediction),
            Err(err) => Outcome::Error(err.into()),
        }
    }
}

/// Process-wide classification service.
///
/// Built once at startup and shared by reference between requests; the
/// model inside it is never mutated after loading.
#[derive(Debug)]
pub struct Predictor {
    labels: LabelSet,
    state: ModelState,
}

impl Predictor {
    pub fn new(labels: LabelSet, backend: impl InferenceBackend + 'static) -> Self {
        Predictor {
            labels,
            state: ModelState::Loaded(Box::new(backend)),
        }
    }

    /// A predictor whose model never loaded; every prediction reports `cause`.
    pub fn failed(labels: LabelSet, cause: impl Into<String>) -> Self {
        Predictor {
            labels,
            state: ModelState::LoadFailed(cause.into()),
        }
    }

    /// Load labels and SavedModel as configured.
    ///
    /// Never fails: a load error is kept and surfaced by [`Predictor::predict`].
    pub fn load(config: &ServeConfig) -> Self {
        info!("Model path being used: {}", config.model_dir.display());

        let labels = match config.labels() {
            Ok(labels) => labels,
            Err(err) => {
                error!("Could not load labels: {}", err);
                return Predictor::failed(LabelSet::default(), err.to_string());
            }
        };

        match SavedModel::load(&config.model_dir, labels.len()) {
            Ok(model) => Predictor::new(labels, model),
            Err(err) => {
                error!("{}", err);
                let cause = match err {
                    Error::ModelLoad(cause) => cause,
                    other => other.to_string(),
                };
                Predictor::failed(labels, cause)
            }
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// The load error, if the model is in the failed state.
    pub fn load_error(&self) -> Option<Error> {
        match &self.state {
            ModelState::Loaded(_) => None,
            ModelState::LoadFailed(cause) => Some(Error::ModelLoad(cause.clone())),
        }
    }

    /// Decode, preprocess, run the model and shape the result.
    pub fn predict(&self, image_bytes: &[u8]) -> Result<Prediction> {
        let layout = match &self.state {
            ModelState::Loaded(backend) => backend.layout(),
            ModelState::LoadFailed(_) => Layout::Nhwc,
        };

        let image = decode_image(image_bytes)?;
        let tensor = preprocess(&image, layout);

        let backend = match &self.state {
            ModelState::Loaded(backend) => backend,
            ModelState::LoadFailed(cause) => return Err(Error::ModelLoad(cause.clone())),
        };

        let t = Timer::start("Running session");
        let scores = backend.infer(&tensor)?;
        t.stop();

        if scores.len() != self.labels.len() {
            return Err(Error::Processing(format!(
                "model returned {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }

        let class_id = argmax(&scores)
            .ok_or_else(|| Error::Processing("model returned no scores".to_owned()))?;
        let probabilities = softmax(&scores);

        Ok(self.build(class_id, &probabilities))
    }

    /// Like [`Predictor::predict`], folding errors into the JSON outcome.
    pub fn respond(&self, image_bytes: &[u8]) -> Outcome {
        let result = self.predict(image_bytes);
        if let Err(err) = &result {
            warn!("{}", err);
        }
        result.into()
    }

    fn build(&self, class_id: usize, probabilities: &[f32]) -> Prediction {
        let all_probabilities = self
            .labels
            .iter()
            .zip(probabilities)
            .map(|(label, &p)| (label.to_owned(), percent(p)))
            .collect();

        Prediction {
            prediction: self.labels.get(class_id).unwrap_or_default().to_owned(),
            class_id,
            confidence: percent(probabilities[class_id]),
            all_probabilities,
        }
    }
}

/// Max-subtracted softmax. Non-finite scores get zero mass.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);

    let exps: Vec<f32> = scores
        .iter()
        .map(|&s| if s.is_finite() { (s - max).exp() } else { 0.0 })
        .collect();

    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![0.0; scores.len()];
    }

    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;

    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }

    best.map(|(i, _)| i)
}

/// Probability as a percentage rounded to two decimals.
fn percent(p: f32) -> f64 {
    (f64::from(p) * 100.0 * 100.0).round() / 100.0
}

use thiserror::Error;

/// Everything that can go wrong between receiving image bytes and
/// producing a classification.
#[derive(Debug, Error)]
pub enum Error {
    /// The SavedModel or its labels could not be brought into memory.
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    /// Decoding, preprocessing or the forward pass failed.
    #[error("Failed to process image: {0}")]
    Processing(String),

    #[error("Invalid label set: {0}")]
    Labels(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("No image data received.")]
    EmptyInput,

    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Processing(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

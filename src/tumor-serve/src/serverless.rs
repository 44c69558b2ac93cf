//! Request handling shared by the function-style adapters.
//!
//! An event carries a base64 image either directly (`{"image": ...}`) or
//! inside an HTTP-style envelope whose `body` is that JSON document. The
//! reply is always a `{"statusCode", "body"}` envelope.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::decode::decode_base64;
use crate::error::Error;
use crate::predictor::{ErrorBody, Predictor};

/// Incoming function invocation.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FunctionEvent {
    #[serde(rename = "httpMethod", default)]
    pub http_method: Option<String>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(rename = "isBase64Encoded", default)]
    pub is_base64_encoded: bool,

    /// Direct invocations may skip the envelope and send the image inline
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagePayload {
    #[serde(default)]
    image: Option<String>,
}

impl FunctionEvent {
    /// Base64 image text carried by the event, if any.
    fn image(&self) -> Option<String> {
        if let Some(image) = self.image.as_ref().filter(|i| !i.trim().is_empty()) {
            return Some(image.clone());
        }

        let body = self.body.as_ref()?;
        let body = if self.is_base64_encoded {
            let raw = STANDARD.decode(body.trim()).ok()?;
            String::from_utf8(raw).ok()?
        } else {
            body.clone()
        };

        let payload: ImagePayload = serde_json::from_str(&body).ok()?;
        payload.image.filter(|i| !i.trim().is_empty())
    }
}

/// Status/body envelope returned to the function runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    pub body: String,
}

impl FunctionResponse {
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        let body = serde_json::to_string(&ErrorBody::new(message))
            .unwrap_or_else(|_| String::from("{\"error\":\"internal error\"}"));

        FunctionResponse { status_code, body }
    }

    fn predict(predictor: &Predictor, image: &[u8]) -> Self {
        let prediction = match predictor.predict(image) {
            Ok(prediction) => prediction,
            Err(err) => {
                warn!("{}", err);
                return FunctionResponse::error(500, err.to_string());
            }
        };

        match serde_json::to_string(&prediction) {
            Ok(body) => FunctionResponse {
                status_code: 200,
                body,
            },
            Err(err) => FunctionResponse::error(500, err.to_string()),
        }
    }
}

/// Handle a JSON event carrying a base64 image.
pub fn handle_event(predictor: &Predictor, event: &FunctionEvent) -> FunctionResponse {
    if let Some(method) = event.http_method.as_deref() {
        if !method.eq_ignore_ascii_case("POST") {
            return FunctionResponse::error(405, "Method Not Allowed");
        }
    }

    let image = match event.image() {
        Some(image) => image,
        None => return FunctionResponse::error(400, "No image provided"),
    };

    let bytes = match decode_base64(&image) {
        Ok(bytes) => bytes,
        Err(err) => return FunctionResponse::error(400, err.to_string()),
    };

    debug!("Received {} byte image", bytes.len());
    FunctionResponse::predict(predictor, &bytes)
}

/// Handle a request whose body is the raw image.
pub fn handle_raw(predictor: &Predictor, body: &[u8]) -> FunctionResponse {
    if body.is_empty() {
        return FunctionResponse::error(400, Error::EmptyInput.to_string());
    }

    FunctionResponse::predict(predictor, body)
}

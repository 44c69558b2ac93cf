use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, error, info, warn};
use serde_json::json;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;
use tumor_serve::{ErrorBody, Predictor, ServeConfig};

const LIVENESS_MESSAGE: &str = "Brain Tumor Classification API is live!";

/// Name of the multipart field holding the uploaded image.
const FILE_FIELD: &str = "file";

#[derive(StructOpt, Debug)]
#[structopt(
    name = "tumor-http",
    about = "HTTP endpoint classifying uploaded brain MRI scans"
)]
struct CmdArgs {
    #[structopt(
        long,
        env = "TUMOR_MODEL_DIR",
        parse(from_os_str),
        help = "Export directory of TensorFlow SavedModel"
    )]
    model_dir: Option<PathBuf>,

    #[structopt(
        long,
        env = "TUMOR_LABELS",
        parse(from_os_str),
        help = "Path to labels file, one label per line"
    )]
    labels: Option<PathBuf>,

    #[structopt(
        long,
        env = "TUMOR_HTTP_ADDR",
        default_value = "127.0.0.1:3000",
        help = "Address to listen on"
    )]
    addr: SocketAddr,

    #[structopt(
        long,
        env = "TUMOR_BODY_LIMIT",
        default_value = "10485760",
        help = "Maximum request body size in bytes"
    )]
    body_limit: usize,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

fn router(predictor: Arc<Predictor>, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(liveness).post(predict))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(predictor)
}

async fn liveness() -> Json<serde_json::Value> {
    Json(json!({ "message": LIVENESS_MESSAGE }))
}

/// First non-empty `file` field of the form, if any.
async fn file_field(multipart: &mut Multipart) -> Result<Option<Bytes>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            let data = field.bytes().await?;
            return Ok(Some(data).filter(|data| !data.is_empty()));
        }
    }

    Ok(None)
}

async fn predict(
    State(predictor): State<Arc<Predictor>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!("Rejected request: {}", rejection);
            return error_response(
                StatusCode::BAD_REQUEST,
                "Content-Type must be multipart/form-data",
            );
        }
    };

    let image = match file_field(&mut multipart).await {
        Ok(Some(image)) => image,
        Ok(None) => return error_response(StatusCode::BAD_REQUEST, "No file provided"),
        Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
        }
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid multipart body: {}", err),
            )
        }
    };

    let result = tokio::task::spawn_blocking(move || predictor.predict(&image)).await;

    match result {
        Ok(Ok(prediction)) => Json(json!({ "prediction": prediction.prediction })).into_response(),
        Ok(Err(err)) => {
            warn!("{}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prediction failed: {}", err),
            )
        }
        Err(err) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Prediction failed: {}", err),
        ),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let config = ServeConfig::resolve(args.model_dir, args.labels);
    let predictor = Predictor::load(&config);

    if let Some(err) = predictor.load_error() {
        error!("Refusing to start: {}", err);
        return Err(err.into());
    }

    let app = router(Arc::new(predictor), args.body_limit);

    info!("Listening on http://{}", args.addr);
    axum::Server::bind(&args.addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use serde_json::Value;
    use std::io::Cursor;
    use tower::ServiceExt;
    use tumor_serve::{ImageTensor, InferenceBackend, LabelSet, Layout};

    const BOUNDARY: &str = "X-TUMOR-BOUNDARY";

    struct FixedScores(Vec<f32>);

    impl InferenceBackend for FixedScores {
        fn layout(&self) -> Layout {
            Layout::Nhwc
        }

        fn infer(&self, _input: &ImageTensor) -> tumor_serve::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    fn app_with_limit(body_limit: usize) -> Router {
        let predictor = Predictor::new(LabelSet::default(), FixedScores(vec![0.1, 0.2, 0.3, 2.0]));
        router(Arc::new(predictor), body_limit)
    }

    fn app() -> Router {
        app_with_limit(1 << 20)
    }

    fn png() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([90, 90, 90])));
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn multipart_body(field: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"scan.png\"\r\n\
             Content-Type: image/png\r\n\r\n",
            b = BOUNDARY,
            f = field
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn multipart_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn get_reports_liveness() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], LIVENESS_MESSAGE);
    }

    #[tokio::test]
    async fn non_multipart_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Content-Type must be multipart/form-data");
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let request = multipart_request(multipart_body("scan", &png()));
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "No file provided" }));
    }

    #[tokio::test]
    async fn empty_file_is_bad_request() {
        let request = multipart_request(multipart_body(FILE_FIELD, b""));
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file provided");
    }

    #[tokio::test]
    async fn upload_is_classified() {
        let request = multipart_request(multipart_body(FILE_FIELD, &png()));
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "prediction": "pituitary" }));
    }

    #[tokio::test]
    async fn oversized_upload_is_payload_too_large() {
        let request = multipart_request(multipart_body(FILE_FIELD, &[0u8; 4096]));
        let (status, body) = send(app_with_limit(256), request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "Payload Too Large");
    }

    #[tokio::test]
    async fn undecodable_upload_is_server_error() {
        let request = multipart_request(multipart_body(FILE_FIELD, b"not an image"));
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Prediction failed: Failed to process image: "));
    }
}

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Request, Response, Server, StatusCode};
use log::{error, info};
use std::convert::Infallible;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tumor_serve::serverless::{handle_raw, FunctionResponse};
use tumor_serve::{Predictor, ServeConfig};

const ADDR_ENV: &str = "TUMOR_HTTP_ADDR";

async fn handle(
    req: Request<Body>,
    predictor: Arc<Predictor>,
) -> Result<Response<Body>, Infallible> {
    let raw = match body::to_bytes(req.into_body()).await {
        Ok(raw) => raw,
        Err(err) => {
            return Ok(render(FunctionResponse::error(
                400,
                format!("Could not read request body: {}", err),
            )))
        }
    };

    let response = tokio::task::spawn_blocking(move || handle_raw(&predictor, &raw))
        .await
        .unwrap_or_else(|err| FunctionResponse::error(500, err.to_string()));

    Ok(render(response))
}

fn render(response: FunctionResponse) -> Response<Body> {
    let mut rendered = Response::new(Body::from(response.body));
    *rendered.status_mut() =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    rendered
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    rendered
}

fn listen_addr() -> SocketAddr {
    env::var(ADDR_ENV)
        .ok()
        .and_then(|addr| addr.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let predictor = Arc::new(Predictor::load(&ServeConfig::from_env()));

    // Each connection gets its own handle on the shared predictor.
    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let predictor = Arc::clone(&predictor);

        let service = service_fn(move |req| handle(req, predictor.clone()));

        async move { Ok::<_, Infallible>(service) }
    });

    let addr = listen_addr();
    info!("Listening on http://{}", addr);

    let server = Server::bind(&addr).serve(make_service);

    if let Err(e) = server.await {
        error!("server error: {}", e);
    }
}

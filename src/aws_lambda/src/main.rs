use lambda_runtime::{service_fn, Error, LambdaEvent};

use log::debug;
use tumor_serve::serverless::{handle_event, FunctionEvent, FunctionResponse};
use tumor_serve::{Predictor, ServeConfig, Timer};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let predictor = Predictor::load(&ServeConfig::from_env());

    debug!("Loaded model in memory");

    let predictor_ref = &predictor;

    let handler_closure = move |event: LambdaEvent<FunctionEvent>| async move {
        handle_request(event, predictor_ref)
    };

    debug!("Dispatching handler");
    lambda_runtime::run(service_fn(handler_closure)).await?;

    Ok(())
}

fn handle_request(
    event: LambdaEvent<FunctionEvent>,
    predictor: &Predictor,
) -> Result<FunctionResponse, Error> {
    debug!("Inside handler");
    debug!("Request id: {}", event.context.request_id);

    let t = Timer::start("Handling request");

    let response = handle_event(predictor, &event.payload);

    t.stop();

    Ok(response)
}

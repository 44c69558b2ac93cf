use std::error::Error;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use structopt::StructOpt;
use tumor_serve::{decode_base64, ErrorBody, Outcome, Predictor, ServeConfig};

use log::debug;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "tumor-classify",
    about = "Classify a base64-encoded brain MRI read from standard input"
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
}

/// Decode the base64 text read from stdin into image bytes.
fn read_image(input: &str) -> Result<Vec<u8>, ErrorBody> {
    decode_base64(input).map_err(ErrorBody::from)
}

/// Logger writing to stderr; `info` unless `RUST_LOG` says otherwise so the
/// model path in use is always reported.
fn logger() -> env_logger::Builder {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
}

fn main() -> Result<(), Box<dyn Error>> {
    logger().init();
    let args = CmdArgs::from_args();

    let mut raw = Vec::new();
    io::stdin().read_to_end(&mut raw)?;
    let input = String::from_utf8_lossy(&raw);

    let image = match read_image(&input) {
        Ok(image) => image,
        Err(body) => {
            println!("{}", serde_json::to_string(&body)?);
            process::exit(1);
        }
    };
    debug!("Read {} byte image from stdin", image.len());

    let config = ServeConfig::resolve(args.model_dir, args.labels);
    let predictor = Predictor::load(&config);

    let outcome: Outcome = predictor.respond(&image);
    println!("{}", serde_json::to_string(&outcome)?);

    Ok(())
}

use std::error::Error;
use std::path::PathBuf;
use structopt::StructOpt;
use tumor_serve::export::export_saved_model;
use tumor_serve::{SavedModel, ServeConfig};

use log::info;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "tumor-export",
    about = "Export the classifier with its weights and an interchange manifest"
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
        short,
        long,
        default_value = "export",
        parse(from_os_str),
        help = "Directory to write the exported model to"
    )]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let config = ServeConfig::resolve(args.model_dir, args.labels);
    info!("Model path being used: {}", config.model_dir.display());

    let labels = config.labels()?;
    let model = SavedModel::load(&config.model_dir, labels.len())?;

    let manifest = export_saved_model(&model, &labels, &args.output)?;

    println!(
        "Model exported successfully to {} ({})",
        args.output.display(),
        manifest.display()
    );

    Ok(())
}

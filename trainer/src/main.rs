use std::{env, io, path::Path};

use env_logger::Env;
use log::info;

use trainer::{Args, bootstrap};

const MODELS_DIR: &str = "models";

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse(env::args().skip(1))?;
    info!(node_id = args.node_id; "starting training");

    bootstrap::run(args, Path::new(MODELS_DIR), io::stdout().lock())?;

    Ok(())
}

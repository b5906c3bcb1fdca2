use std::{env, io, path::Path};

use env_logger::Env;
use log::info;
use machine_learning::{Checkpoint, Device};

use server::NetworkScorer;

const MODELS_DIR: &str = "models";

#[tokio::main(flavor = "current_thread")]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let node_id: u32 = env::args()
        .nth(1)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "usage: server <node id>"))?
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("node id: {e}")))?;

    let path = Checkpoint::path(Path::new(MODELS_DIR), node_id);
    info!("loading model from {}", path.display());

    let checkpoint = Checkpoint::load(&path).map_err(io::Error::from)?;
    let mut scorer = NetworkScorer::from_checkpoint(checkpoint, Device::default())?;

    let (rx, tx) = comms::channel(tokio::io::stdin(), tokio::io::stdout());
    info!("ready");

    server::serve(rx, tx, &mut scorer).await?;
    Ok(())
}

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use blockrelay_common::config::{load_file, Loader};
use blockrelay_common::setup_tracing;
use blockrelay_relayer::config::RelayerFile;
use blockrelay_relayer::{relayer_key_from_env, RelayerNode};
use blockrelay_sdk::NetworkConfig;

const CONFIG_NAME: &str = "blockrelay-relayer";

#[derive(Debug, Clone, Subcommand)]
enum Method {
    /// Relays until interrupted.
    Run,
    /// Runs one tick of every direction and prints the outcome.
    Once,
    /// Prints the cursor of every direction.
    Cursors,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the one in the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    method: Method,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    setup_tracing();
    let args = Args::parse();
    let signer = relayer_key_from_env()?;

    let loader = Loader::new(CONFIG_NAME)?;
    let default = include_str!("../config.toml");
    let (network, file, config_dir): (NetworkConfig, RelayerFile, PathBuf) = match &args.config {
        Some(path) => (
            load_file(path)?,
            load_file(path)?,
            path.parent().map(PathBuf::from).unwrap_or_default(),
        ),
        None => (
            loader.load_or_create(default)?,
            loader.load_or_create(default)?,
            loader.config_dir().into(),
        ),
    };
    let node = RelayerNode::from_config(&network, file.relayer, &signer, &config_dir).await?;

    match args.method {
        Method::Run => {
            let node = Arc::new(node);
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(node.run(cancel.clone()));
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            cancel.cancel();
            handle.await?;
        },
        Method::Once => {
            for (key, result) in node.run_once().await {
                match result {
                    Ok(report) => println!(
                        "{}: {} cycles, relayed {} requests in {:?}, cursor {:?}",
                        key,
                        report.cycles,
                        report.relayed.len(),
                        report.relay_txs,
                        report.cursor
                    ),
                    Err(e) => warn!(key = %key, error = %e, "tick failed"),
                }
            }
        },
        Method::Cursors => {
            for direction in node.directions() {
                println!("{}: {:?}", direction.key(), node.cursor(direction).await);
            }
        },
    }
    Ok(())
}

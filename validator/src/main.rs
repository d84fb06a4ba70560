use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use blockrelay_common::config::{load_file, Loader};
use blockrelay_common::setup_tracing;
use blockrelay_validator::{init, signers_from_env, Config};

const CONFIG_NAME: &str = "blockrelay-validator";

#[derive(Debug, Clone, Subcommand)]
enum Method {
    /// Attests checkpoints until interrupted.
    Run,
    /// Runs a single cycle over every tracked chain and prints what was attested.
    Once,
    /// Prints the validator addresses derived from the configured keys.
    ShowAddresses,
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
    let signers = signers_from_env()?;

    if let Method::ShowAddresses = args.method {
        for signer in &signers {
            println!("{}", signer.address());
        }
        return Ok(());
    }

    let loader = Loader::new(CONFIG_NAME)?;
    let (config, config_dir): (Config, PathBuf) = match &args.config {
        Some(path) => {
            let dir = path.parent().map(PathBuf::from).unwrap_or_default();
            (load_file(path)?, dir)
        },
        None => {
            (loader.load_or_create(include_str!("../config.toml"))?, loader.config_dir().into())
        },
    };
    let attestation = init(config, &config_dir, signers).await?;

    match args.method {
        Method::Run => {
            let attestation = Arc::new(attestation);
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(attestation.run(cancel.clone()));
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            cancel.cancel();
            handle.await?;
        },
        Method::Once => {
            for (chain_id, result) in attestation.run_once().await {
                match result {
                    Ok(report) => println!(
                        "chain {}: checkpoint {} attested {:?} skipped {:?}",
                        chain_id, report.checkpoint, report.attested, report.skipped
                    ),
                    Err(e) => warn!(chain_id, error = %e, "cycle failed"),
                }
            }
        },
        Method::ShowAddresses => {},
    }
    Ok(())
}

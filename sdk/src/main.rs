use alloy_primitives::B256;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;
use std::error::Error;
use std::path::PathBuf;

use blockrelay_common::config::{load_file, Loader};
use blockrelay_common::setup_tracing;
use blockrelay_common::signer::BlockSigner;
use blockrelay_sdk::{build_receipt_proof, get_chain_block_headers, NetworkConfig};

/// The SDK shares the relayer node's config file.
const CONFIG_NAME: &str = "blockrelay-relayer";

#[derive(Debug, Clone, Subcommand)]
enum Method {
    /// Proves the receipts of `tx_hashes` on `source` to the bridge on `target`.
    Relay {
        source: u64,
        target: u64,
        #[arg(required = true)]
        tx_hashes: Vec<B256>,
        /// Print the relay hash and exit without waiting for confirmation.
        #[arg(long)]
        no_wait: bool,
    },
    Proof { chain: u64, tx_hash: B256 },
    Headers { chain: u64, from: u64, to: u64 },
    Checkpoint { chain: u64, block: u64 },
    LatestCheckpoint { chain: u64 },
    ShowAddress,
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

fn relayer_key() -> Result<BlockSigner, Box<dyn Error>> {
    let secret = std::env::var("RELAYER_KEY").map_err(|_| "RELAYER_KEY is not set")?;
    Ok(BlockSigner::from_hex(&secret)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    setup_tracing();
    let args = Args::parse();
    let config: NetworkConfig = match &args.config {
        Some(path) => load_file(path)?,
        None => Loader::new(CONFIG_NAME)?.load_or_create(include_str!("../config.toml"))?,
    };

    match args.method {
        Method::Relay { source, target, tx_hashes, no_wait } => {
            let signer = relayer_key()?;
            let relayer = config.relayer(Some(&signer)).await?;
            let outcome = relayer.relay_txs(source, target, &tx_hashes).await?;
            println!("relay tx: {}", outcome.relay_tx_hash);
            println!("checkpoint: {}", outcome.checkpoint);
            for request in &outcome.bridge_requests {
                println!(
                    "bridge request {}: {} -> {} amount {}",
                    request.id, request.from, request.to, request.amount
                );
            }
            if !no_wait {
                let receipt = outcome.confirmation.await?;
                println!("confirmed in block {:?}", receipt.block_number);
            }
        },
        Method::Proof { chain, tx_hash } => {
            let rpc = config.rpc_pool().await.client(chain).await?;
            let built = build_receipt_proof(rpc.as_ref(), chain, tx_hash).await?;
            let output = json!({
                "blockNumber": built.block_number(),
                "transactionIndex": built.transaction_index,
                "blockHeaderRlp": built.header.rlp(),
                "proof": built.proof,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        },
        Method::Headers { chain, from, to } => {
            let rpc = config.rpc_pool().await.client(chain).await?;
            for header in get_chain_block_headers(rpc.as_ref(), chain, from, to).await? {
                println!("{} {} {}", header.number(), header.hash(), header.rlp());
            }
        },
        Method::Checkpoint { chain, block } => {
            let rpc = config.rpc_pool().await.client(chain).await?;
            let resolver = config.resolver(config.registry_client()?);
            let checkpoint = resolver.resolve(rpc.as_ref(), chain, block).await?;
            let output = json!({
                "blockNumber": checkpoint.block_number,
                "blockHash": checkpoint.block_hash,
                "signers": checkpoint.signers,
                "signatures": checkpoint.signatures,
                "cycleEnd": checkpoint.cycle_end,
                "validators": checkpoint.validators,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        },
        Method::LatestCheckpoint { chain } => {
            let resolver = config.resolver(config.registry_client()?);
            println!("{}", resolver.latest_checkpoint(chain).await?);
        },
        Method::ShowAddress => {
            println!("{}", relayer_key()?.address());
        },
    }
    Ok(())
}

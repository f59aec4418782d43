//! walletkit command-line tool.
//!
//! # Usage
//!
//! ```bash
//! # Which Solana endpoint would be used right now
//! walletkit endpoint solana
//!
//! # Latest blockhash on devnet, falling back to the emergency copy
//! walletkit --network testnet chain-tip solana --emergency
//!
//! # Follow an Ethereum transaction to 12 confirmations
//! walletkit watch ethereum 0xabc... --confirmations 12
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the TOML configuration file (default: `walletkit.toml`)
//! - `WALLETKIT_STORE` - Overrides the store path from the config
//! - `RUST_LOG` - Log level filter (default: `info`)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use walletkit::{Chain, Network};

use walletkit_cli::commands;
use walletkit_cli::config::{CliConfig, DEFAULT_CONFIG_PATH};
use walletkit_cli::context::AppContext;
use walletkit_cli::shutdown::Shutdown;

#[derive(Debug, Parser)]
#[command(name = "walletkit", version, about = "Inspect wallet sessions and RPC endpoints")]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Network to query; defaults to the stored active network.
    #[arg(long, short, global = true)]
    network: Option<Network>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the endpoint the resolver picks and all candidates.
    Endpoint { chain: Chain },
    /// Health-check every candidate endpoint.
    Health { chain: Chain },
    /// Fetch the latest blockhash (solana) or pending nonce (ethereum).
    ChainTip {
        chain: Chain,
        /// Account whose nonce to fetch (ethereum only).
        #[arg(long)]
        address: Option<String>,
        /// Fall back to the emergency cache if every source fails.
        #[arg(long)]
        emergency: bool,
    },
    /// Query an account balance.
    Balance { chain: Chain, address: String },
    /// Poll a transaction until it confirms or fails.
    Watch {
        chain: Chain,
        tx_hash: String,
        /// Confirmations required before reporting success.
        #[arg(long, default_value_t = 1)]
        confirmations: u64,
        /// Seconds between polls.
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
    },
    /// Inspect or clear the stored session.
    #[command(subcommand)]
    Session(SessionCommand),
    /// Inspect or change stored preferences.
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

#[derive(Debug, Subcommand)]
enum SessionCommand {
    /// Print the session, evicting it if expired.
    Show,
    /// Remove the session.
    Clear,
}

#[derive(Debug, Subcommand)]
enum PrefsCommand {
    /// Print stored preferences.
    Show,
    /// Set the custom Solana RPC URL; omit to clear.
    SetRpc { url: Option<String> },
    /// Set the Alchemy API key; omit to clear.
    SetApiKey { key: Option<String> },
    /// Select the active network.
    SetNetwork {
        #[arg(value_name = "NETWORK")]
        selected: Network,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        tracing::error!("walletkit failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        tracing::warn!("Ignoring .env: {e}");
    }

    let cli = Cli::parse();
    let config = CliConfig::load_from(&cli.config)?;
    let ctx = AppContext::open(config)?;
    let network = ctx.network(cli.network);

    match cli.command {
        Command::Endpoint { chain } => commands::endpoint(&ctx, chain, network)?,
        Command::Health { chain } => commands::health(&ctx, chain, network).await,
        Command::ChainTip {
            chain,
            address,
            emergency,
        } => commands::chain_tip(&ctx, chain, network, address.as_deref(), emergency).await?,
        Command::Balance { chain, address } => {
            commands::balance(&ctx, chain, network, &address).await?;
        }
        Command::Watch {
            chain,
            tx_hash,
            confirmations,
            interval_secs,
        } => {
            let shutdown = Shutdown::install()?;
            let state = commands::watch(
                &ctx,
                chain,
                network,
                &tx_hash,
                confirmations,
                Duration::from_secs(interval_secs.max(1)),
                &shutdown.token(),
            )
            .await;
            shutdown.finish().await;
            tracing::info!(status = ?state.status, polls = state.polls, "Watch ended");
        }
        Command::Session(SessionCommand::Show) => commands::session_show(&ctx),
        Command::Session(SessionCommand::Clear) => commands::session_clear(&ctx)?,
        Command::Prefs(PrefsCommand::Show) => commands::prefs_show(&ctx),
        Command::Prefs(PrefsCommand::SetRpc { url }) => {
            commands::prefs_set_rpc(&ctx, url.as_deref())?;
        }
        Command::Prefs(PrefsCommand::SetApiKey { key }) => {
            commands::prefs_set_api_key(&ctx, key.as_deref())?;
        }
        Command::Prefs(PrefsCommand::SetNetwork { selected }) => {
            commands::prefs_set_network(&ctx, selected)?;
        }
    }
    Ok(())
}

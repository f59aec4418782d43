//! Command implementations. Each prints its result as JSON on stdout.

#![allow(clippy::print_stdout)]

use alloy_primitives::Address;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use walletkit::storage::StorageError;
use walletkit::{Chain, Network};
use walletkit_evm::nonce_cache;
use walletkit_rpc::endpoints::validate_custom_url;
use walletkit_rpc::{RpcError, TransactionMonitor, TransactionWatch};
use walletkit_svm::{AddressError, SolanaAddress};

use crate::context::AppContext;

/// Lamports per SOL.
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Errors a command can end with.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// An RPC call failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The store could not be written.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A Solana address did not parse.
    #[error(transparent)]
    SolanaAddress(#[from] AddressError),
    /// An Ethereum address did not parse.
    #[error("Invalid Ethereum address '{0}'")]
    EthereumAddress(String),
    /// The command needs an account address for this chain.
    #[error("--address is required for {0}")]
    MissingAddress(Chain),
    /// No chain tip, fresh or emergency, is available.
    #[error("No chain tip available for {0}")]
    NoChainTip(Network),
}

fn print(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

fn parse_evm_address(raw: &str) -> Result<Address, CommandError> {
    raw.trim()
        .parse()
        .map_err(|_| CommandError::EthereumAddress(raw.to_owned()))
}

/// Prints the endpoint the resolver picks and every candidate.
///
/// # Errors
///
/// Returns [`CommandError::Rpc`] if the chain has no endpoints.
pub fn endpoint(ctx: &AppContext, chain: Chain, network: Network) -> Result<(), CommandError> {
    let resolved = ctx.resolver.resolve(chain, network)?;
    let candidates: Vec<Value> = ctx
        .resolver
        .candidates(chain, network)
        .iter()
        .map(|url| {
            json!({
                "url": url.as_str(),
                "cooling_down": ctx.resolver.is_cooling_down(url),
            })
        })
        .collect();
    print(&json!({
        "chain": chain,
        "network": ctx.resolver.effective_network(network),
        "resolved": resolved.as_str(),
        "candidates": candidates,
    }));
    Ok(())
}

/// Checks every candidate endpoint and prints the outcome per URL.
pub async fn health(ctx: &AppContext, chain: Chain, network: Network) {
    let results: Vec<Value> = ctx
        .health(chain, network)
        .await
        .into_iter()
        .map(|(url, result)| match result {
            Ok(()) => json!({ "url": url.as_str(), "healthy": true }),
            Err(err) => json!({ "url": url.as_str(), "healthy": false, "error": err.to_string() }),
        })
        .collect();
    print(&json!({ "chain": chain, "network": network, "endpoints": results }));
}

/// Prints the latest blockhash (Solana) or pending nonce (Ethereum).
///
/// # Errors
///
/// Returns [`CommandError`] if no source produced a value or the address is invalid.
pub async fn chain_tip(
    ctx: &AppContext,
    chain: Chain,
    network: Network,
    address: Option<&str>,
    allow_emergency: bool,
) -> Result<(), CommandError> {
    let cache = match chain {
        Chain::Solana => ctx.blockhash_cache(),
        Chain::Ethereum => {
            let raw = address.ok_or(CommandError::MissingAddress(chain))?;
            nonce_cache(&ctx.ethereum, parse_evm_address(raw)?)
        }
    };
    let tip = if allow_emergency {
        cache
            .get_or_emergency(network)
            .await
            .ok_or(CommandError::NoChainTip(network))?
    } else {
        cache.get_fresh(network).await?
    };
    print(&json!({
        "chain": chain,
        "network": network,
        "value": tip.value,
        "source": tip.source,
    }));
    Ok(())
}

/// Prints an account balance.
///
/// # Errors
///
/// Returns [`CommandError`] if the address is invalid or every endpoint fails.
pub async fn balance(
    ctx: &AppContext,
    chain: Chain,
    network: Network,
    address: &str,
) -> Result<(), CommandError> {
    match chain {
        Chain::Solana => {
            let address: SolanaAddress = address.parse()?;
            let lamports = ctx.solana.balance(&address, network).await?;
            let sol = lamports as f64 / LAMPORTS_PER_SOL;
            print(&json!({
                "chain": chain,
                "address": address,
                "lamports": lamports,
                "sol": sol,
            }));
        }
        Chain::Ethereum => {
            let address = parse_evm_address(address)?;
            let wei = ctx.ethereum.balance(address, network).await?;
            print(&json!({
                "chain": chain,
                "address": address.to_checksum(None),
                "wei": wei.to_string(),
            }));
        }
    }
    Ok(())
}

/// Polls a transaction until it is terminal or `shutdown` fires, printing each update.
///
/// Returns the final state.
pub async fn watch(
    ctx: &AppContext,
    chain: Chain,
    network: Network,
    tx_hash: &str,
    confirmations: u64,
    interval: Duration,
    shutdown: &CancellationToken,
) -> TransactionWatch {
    let monitor = TransactionMonitor::new(ctx.status_source(chain))
        .with_interval(interval)
        .with_required_confirmations(confirmations);
    let handle = monitor.watch(tx_hash, network);
    let mut updates = handle.subscribe();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!(tx_hash, "Stopping watch");
                handle.stop();
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                print(&json!(state));
                if state.status.is_terminal() {
                    break;
                }
            }
        }
    }
    handle.current()
}

/// Prints the stored session, evicting it if expired.
pub fn session_show(ctx: &AppContext) {
    let session = ctx.sessions.current();
    print(&json!({
        "session": session,
        "explicitly_disconnected": ctx.sessions.is_explicitly_disconnected(),
    }));
}

/// Clears the stored session.
///
/// # Errors
///
/// Returns [`CommandError::Storage`] if the store cannot be written.
pub fn session_clear(ctx: &AppContext) -> Result<(), CommandError> {
    ctx.sessions.clear()?;
    tracing::info!("Session cleared");
    Ok(())
}

/// Prints stored preferences with the API key masked.
pub fn prefs_show(ctx: &AppContext) {
    let masked = ctx.preferences.alchemy_api_key().map(|key| {
        let visible: String = key.chars().take(4).collect();
        format!("{visible}…")
    });
    print(&json!({
        "custom_solana_rpc_url": ctx.preferences.custom_solana_rpc_url(),
        "alchemy_api_key": masked,
        "active_network": ctx.preferences.active_network(),
    }));
}

/// Sets or clears the custom Solana RPC URL after validating it.
///
/// # Errors
///
/// Returns [`CommandError`] if the URL is invalid or the store cannot be written.
pub fn prefs_set_rpc(ctx: &AppContext, url: Option<&str>) -> Result<(), CommandError> {
    if let Some(raw) = url {
        validate_custom_url(raw)?;
    }
    ctx.preferences.set_custom_solana_rpc_url(url)?;
    Ok(())
}

/// Sets or clears the Alchemy API key.
///
/// # Errors
///
/// Returns [`CommandError::Storage`] if the store cannot be written.
pub fn prefs_set_api_key(ctx: &AppContext, key: Option<&str>) -> Result<(), CommandError> {
    ctx.preferences.set_alchemy_api_key(key)?;
    Ok(())
}

/// Selects the active network.
///
/// # Errors
///
/// Returns [`CommandError::Storage`] if the store cannot be written.
pub fn prefs_set_network(ctx: &AppContext, network: Network) -> Result<(), CommandError> {
    ctx.preferences.set_active_network(network)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliConfig;
    use std::sync::Arc;
    use walletkit::WalletType;
    use walletkit::storage::MemoryStore;

    fn context() -> AppContext {
        AppContext::with_store(CliConfig::default(), Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_set_rpc_rejects_invalid_url() {
        let ctx = context();
        let err = prefs_set_rpc(&ctx, Some("ftp://example.com")).unwrap_err();
        assert!(matches!(err, CommandError::Rpc(RpcError::InvalidEndpoint { .. })));
        assert_eq!(ctx.preferences.custom_solana_rpc_url(), None);

        prefs_set_rpc(&ctx, Some("https://rpc.example.com")).unwrap();
        prefs_set_rpc(&ctx, None).unwrap();
        assert_eq!(ctx.preferences.custom_solana_rpc_url(), None);
    }

    #[test]
    fn test_session_clear() {
        let ctx = context();
        ctx.sessions
            .store("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", WalletType::Phantom)
            .unwrap();
        assert!(ctx.sessions.is_valid());
        session_clear(&ctx).unwrap();
        assert!(ctx.sessions.get().is_none());
    }

    #[tokio::test]
    async fn test_ethereum_chain_tip_needs_address() {
        let ctx = context();
        let err = chain_tip(&ctx, Chain::Ethereum, Network::Mainnet, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::MissingAddress(Chain::Ethereum)));

        let err = chain_tip(&ctx, Chain::Ethereum, Network::Mainnet, Some("0x12"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::EthereumAddress(_)));
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let ctx = context();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let state = watch(
            &ctx,
            Chain::Solana,
            Network::Testnet,
            "not-a-signature",
            1,
            Duration::from_secs(10),
            &shutdown,
        )
        .await;
        assert!(!state.status.is_terminal());
    }
}

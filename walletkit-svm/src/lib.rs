#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana support for walletkit.
//!
//! # Architecture
//!
//! - [`address`] - Base58 addresses and signature validation
//! - [`connector`] - Phantom and Solflare connectors
//! - [`networks`] - Public and keyed endpoint pools
//! - [`rpc`] - Blockhash, signature status, balance and health queries
//! - [`tip`] - Blockhash sources for the chain-tip cache
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use walletkit_rpc::{EndpointRegistry, EndpointResolver, JsonRpcClient, RpcFailover};
//! use walletkit_svm::{SOLANA_ENDPOINTS, SolanaRpc, blockhash_cache};
//!
//! let registry = EndpointRegistry::new().with_specs(SOLANA_ENDPOINTS)?;
//! let resolver = Arc::new(EndpointResolver::new(registry).with_preferences(preferences));
//! let rpc = SolanaRpc::new(RpcFailover::new(resolver, JsonRpcClient::new()));
//! let cache = blockhash_cache(&rpc, Some(preferences), None);
//! let tip = cache.get_fresh(Network::Mainnet).await?;
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod address;
pub mod connector;
pub mod networks;
pub mod rpc;
pub mod tip;

pub use address::{AddressError, SolanaAddress};
pub use connector::{SolanaConnector, connectors};
pub use networks::SOLANA_ENDPOINTS;
pub use rpc::SolanaRpc;
pub use tip::blockhash_cache;

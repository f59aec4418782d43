#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! RPC resilience for walletkit.
//!
//! Public RPC endpoints rate-limit, time out and go down without notice.
//! This crate keeps requests flowing by spreading them over endpoint pools,
//! benching endpoints that fail, caching the values transactions need and
//! polling for finality without ever giving up on a transaction because one
//! poll failed.
//!
//! # Modules
//!
//! - [`chain_tip`] - Blockhash / nonce cache with an emergency fallback
//! - [`endpoints`] - Endpoint pools and the cooldown-aware resolver
//! - [`error`] - RPC error type and transient classification
//! - [`failover`] - JSON-RPC calls that move to another endpoint on failure
//! - [`jsonrpc`] - JSON-RPC 2.0 over HTTPS
//! - [`monitor`] - Transaction status polling
//! - [`proxy`] - Edge-function RPC proxy client
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod chain_tip;
pub mod endpoints;
pub mod error;
pub mod failover;
pub mod jsonrpc;
pub mod monitor;
pub mod proxy;

pub use chain_tip::{CachedChainTip, ChainTipCache, TipFetcher, TipSource};
pub use endpoints::{EndpointRegistry, EndpointResolver, EndpointSpec, ResolverConfig};
pub use error::RpcError;
pub use failover::RpcFailover;
pub use jsonrpc::JsonRpcClient;
pub use monitor::{StatusReport, StatusSource, TransactionMonitor, TransactionWatch, TxStatus};
pub use proxy::EdgeProxyClient;

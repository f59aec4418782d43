#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Ethereum support for walletkit.
//!
//! - [`connector`] - EIP-1193 (MetaMask, Phantom) and WalletConnect connectors
//! - [`networks`] - Chain ids and endpoint pools for mainnet and Sepolia
//! - [`rpc`] - Nonce, receipt, block height, balance and health queries
//! - [`tip`] - Pending nonce as the cached chain tip
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod connector;
pub mod networks;
pub mod rpc;
pub mod tip;

pub use connector::{Eip1193Connector, WalletConnectConnector, connectors};
pub use networks::{ETHEREUM_ENDPOINTS, chain_id};
pub use rpc::{EvmRpc, TransactionReceipt};
pub use tip::nonce_cache;

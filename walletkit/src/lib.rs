#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for multi-chain wallet connections.
//!
//! This crate is chain-agnostic. It defines the shapes of the wallet providers
//! an application consumes (Solana-style, EIP-1193 and WalletConnect), the
//! session lifecycle around them, and the resilience primitives the chain
//! crates build on. Chain-specific connectors and RPC plumbing live in
//! `walletkit-svm`, `walletkit-evm` and `walletkit-rpc`.
//!
//! # Modules
//!
//! - [`chain`] - Chains, networks and wallet types
//! - [`clock`] - Wall-clock timestamps and injectable clocks
//! - [`connect`] - Connector trait, registry and the connection manager
//! - [`detect`] - Presence checks over injected wallet providers
//! - [`error`] - Wallet error taxonomy
//! - [`events`] - Typed session notifications
//! - [`platform`] - Device detection, install pages and deep links
//! - [`preferences`] - User-configured RPC and network settings
//! - [`provider`] - Wallet provider capability traits
//! - [`recovery`] - Silent session re-validation and restore-on-load
//! - [`retry`] - Exponential backoff with jitter
//! - [`session`] - Persisted wallet session state
//! - [`storage`] - Key-value storage backends
//! - [`task`] - Cancellable repeating tasks
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod chain;
pub mod clock;
pub mod connect;
pub mod detect;
pub mod error;
pub mod events;
pub mod platform;
pub mod preferences;
pub mod provider;
pub mod recovery;
pub mod retry;
pub mod session;
pub mod storage;
pub mod task;

pub use chain::{Chain, Network, WalletType};
pub use error::WalletError;

//! Command-line front end for walletkit.
//!
//! Resolves endpoints, fetches chain tips and balances, watches
//! transactions and manages the stored session and preferences.
//!
//! # Modules
//!
//! - [`commands`] - Command implementations
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`context`] - Store, resolver and chain client wiring
//! - [`shutdown`] - Signal handling for long-running commands

pub mod commands;
pub mod config;
pub mod context;
pub mod shutdown;

pub use commands::CommandError;
pub use config::{CliConfig, ConfigError};
pub use context::{AppContext, ContextError};
pub use shutdown::Shutdown;

//! Chains, networks and wallet types.
//!
//! - [`Chain`] - The blockchain family a wallet or endpoint belongs to
//! - [`Network`] - Production or test deployment of a chain
//! - [`WalletType`] - The wallet applications a session can be bound to
//!
//! All three serialize as lowercase strings, which is also how they are
//! persisted in the key-value store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A blockchain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Solana (SVM).
    Solana,
    /// Ethereum (EVM).
    Ethereum,
}

impl Chain {
    /// Returns the lowercase identifier of the chain.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Solana => "solana",
            Self::Ethereum => "ethereum",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown chain, network or wallet type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} '{value}'")]
pub struct UnknownVariantError {
    kind: &'static str,
    value: String,
}

impl UnknownVariantError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

impl FromStr for Chain {
    type Err = UnknownVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solana" | "sol" => Ok(Self::Solana),
            "ethereum" | "eth" => Ok(Self::Ethereum),
            _ => Err(UnknownVariantError::new("chain", s)),
        }
    }
}

/// A deployment of a chain.
///
/// `Testnet` maps to Solana devnet and Ethereum Sepolia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
}

impl Network {
    /// Returns the lowercase identifier of the network.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = UnknownVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "mainnet-beta" => Ok(Self::Mainnet),
            "testnet" | "devnet" | "sepolia" => Ok(Self::Testnet),
            _ => Err(UnknownVariantError::new("network", s)),
        }
    }
}

/// A wallet application a session can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    /// Phantom, Solana provider.
    Phantom,
    /// Phantom, Ethereum provider.
    PhantomEthereum,
    /// Solflare.
    Solflare,
    /// MetaMask.
    Metamask,
    /// WalletConnect / Reown modal.
    Walletconnect,
}

impl WalletType {
    /// Every supported wallet type.
    pub const ALL: [Self; 5] = [
        Self::Phantom,
        Self::PhantomEthereum,
        Self::Solflare,
        Self::Metamask,
        Self::Walletconnect,
    ];

    /// Returns the persisted identifier of the wallet type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Phantom => "phantom",
            Self::PhantomEthereum => "phantom_ethereum",
            Self::Solflare => "solflare",
            Self::Metamask => "metamask",
            Self::Walletconnect => "walletconnect",
        }
    }

    /// Returns the chain the wallet signs for.
    #[must_use]
    pub const fn chain(&self) -> Chain {
        match self {
            Self::Phantom | Self::Solflare => Chain::Solana,
            Self::PhantomEthereum | Self::Metamask | Self::Walletconnect => Chain::Ethereum,
        }
    }

    /// Returns `true` if the wallet's mobile app can be opened through a URI scheme.
    #[must_use]
    pub const fn supports_deep_link(&self) -> bool {
        matches!(self, Self::Metamask)
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletType {
    type Err = UnknownVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phantom" => Ok(Self::Phantom),
            "phantom_ethereum" | "phantom-ethereum" => Ok(Self::PhantomEthereum),
            "solflare" => Ok(Self::Solflare),
            "metamask" => Ok(Self::Metamask),
            "walletconnect" | "reown" => Ok(Self::Walletconnect),
            _ => Err(UnknownVariantError::new("wallet type", s)),
        }
    }
}

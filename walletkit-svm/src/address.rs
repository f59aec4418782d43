//! Solana account addresses and transaction signatures.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_pubkey::Pubkey;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Length of an ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Errors raised when parsing addresses or signatures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The value is not a base58 public key.
    #[error("Invalid Solana address '{0}'")]
    InvalidAddress(String),
    /// The value is not a base58 64-byte signature.
    #[error("Invalid Solana signature '{0}'")]
    InvalidSignature(String),
}

/// A base58 Solana account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolanaAddress(Pubkey);

impl SolanaAddress {
    /// Wraps a public key.
    #[must_use]
    pub const fn new(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }

    /// The inner public key.
    #[must_use]
    pub const fn pubkey(&self) -> &Pubkey {
        &self.0
    }
}

impl FromStr for SolanaAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Pubkey::from_str(trimmed)
            .map(Self)
            .map_err(|_| AddressError::InvalidAddress(trimmed.to_owned()))
    }
}

impl Display for SolanaAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Serialize for SolanaAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SolanaAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Checks that `signature` is a base58-encoded 64-byte signature.
///
/// # Errors
///
/// Returns [`AddressError::InvalidSignature`] otherwise.
pub fn validate_signature(signature: &str) -> Result<(), AddressError> {
    let invalid = || AddressError::InvalidSignature(signature.to_owned());
    let bytes = bs58::decode(signature).into_vec().map_err(|_| invalid())?;
    if bytes.len() == SIGNATURE_LEN {
        Ok(())
    } else {
        Err(invalid())
    }
}

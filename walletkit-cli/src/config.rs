//! CLI configuration.
//!
//! Loaded from a TOML file. String values may reference environment
//! variables as `$VAR` or `${VAR}`; unresolved references are kept verbatim.
//!
//! # Example Configuration
//!
//! ```toml
//! store_path = "walletkit-store.json"
//!
//! [resolver]
//! force_mainnet = false
//! cooldown_secs = 60
//!
//! [edge_proxy]
//! base_url = "https://abc.supabase.co"
//! api_key = "$SUPABASE_ANON_KEY"
//!
//! [preferences]
//! custom_solana_rpc_url = "${SOLANA_RPC_URL}"
//! alchemy_api_key = "$ALCHEMY_API_KEY"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the configuration file (default: `walletkit.toml`)
//! - `WALLETKIT_STORE` - Overrides `store_path`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;
use walletkit_rpc::ResolverConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "walletkit.toml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read config file {path}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`CliConfig`].
    #[error("Failed to parse config file {path}")]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// JSON file holding the session and preferences (default: `walletkit-store.json`).
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Endpoint resolver settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Edge proxy used as a blockhash source, if deployed.
    #[serde(default)]
    pub edge_proxy: Option<EdgeProxyConfig>,

    /// Preferences written to the store on startup.
    #[serde(default)]
    pub preferences: PreferenceOverrides,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            resolver: ResolverConfig::default(),
            edge_proxy: None,
            preferences: PreferenceOverrides::default(),
        }
    }
}

/// Location and credentials of the edge proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeProxyConfig {
    /// Deployment base URL; the function path is appended.
    pub base_url: Url,
    /// Anonymous key sent as `apikey` and bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Preference values that, when present, replace the stored ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceOverrides {
    /// Custom Solana RPC endpoint.
    #[serde(default)]
    pub custom_solana_rpc_url: Option<String>,
    /// Alchemy API key.
    #[serde(default)]
    pub alchemy_api_key: Option<String>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("walletkit-store.json")
}

impl CliConfig {
    /// Loads configuration from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            #[cfg(feature = "telemetry")]
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            String::new()
        };
        let mut config = Self::parse(&expand_env_vars(&content)).map_err(|source| {
            ConfigError::Parse {
                path: path.to_owned(),
                source,
            }
        })?;

        if let Ok(store) = std::env::var("WALLETKIT_STORE")
            && !store.trim().is_empty()
        {
            config.store_path = PathBuf::from(store);
        }
        Ok(config)
    }

    /// Parses configuration from TOML text without env expansion.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the text is invalid.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Expands `$VAR` and `${VAR}` from the process environment.
fn expand_env_vars(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed, braced) = if let Some(inner) = after.strip_prefix('{') {
            match inner.find('}') {
                Some(end) => (&inner[..end], end + 2, true),
                None => ("", 0, true),
            }
        } else {
            let end = after
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(after.len());
            (&after[..end], end, false)
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None if braced => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            }
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "KEY" => Some("secret".to_owned()),
            "HOST" => Some("abc.supabase.co".to_owned()),
            _ => None,
        }
    }

    #[test]
    fn test_expands_plain_and_braced() {
        assert_eq!(
            expand_with("https://${HOST}/v1?key=$KEY", lookup),
            "https://abc.supabase.co/v1?key=secret"
        );
    }

    #[test]
    fn test_unresolved_vars_are_kept() {
        assert_eq!(expand_with("$MISSING ${ALSO}", lookup), "$MISSING ${ALSO}");
        assert_eq!(expand_with("cost: $5 and $", lookup), "cost: $5 and $");
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.resolver.cooldown_secs, 60);
        assert!(!config.resolver.force_mainnet);
    }

    #[test]
    fn test_full_config() {
        let config = CliConfig::parse(
            r#"
            store_path = "/tmp/store.json"

            [resolver]
            force_mainnet = true

            [edge_proxy]
            base_url = "https://abc.supabase.co"
            api_key = "anon"

            [preferences]
            alchemy_api_key = "k"
            "#,
        )
        .unwrap();
        assert_eq!(config.store_path, PathBuf::from("/tmp/store.json"));
        assert!(config.resolver.force_mainnet);
        assert_eq!(config.resolver.cooldown_secs, 60);
        let proxy = config.edge_proxy.unwrap();
        assert_eq!(proxy.base_url.host_str(), Some("abc.supabase.co"));
        assert_eq!(config.preferences.alchemy_api_key.as_deref(), Some("k"));
        assert_eq!(config.preferences.custom_solana_rpc_url, None);
    }
}

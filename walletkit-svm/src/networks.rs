//! Well-known Solana RPC endpoints.
//!
//! Public endpoints are free and rate-limited; the keyed template is used
//! when the user has configured an Alchemy API key.

use walletkit::{Chain, Network};
use walletkit_rpc::endpoints::EndpointSpec;

/// Public Solana mainnet endpoints.
pub const SOLANA_MAINNET_PUBLIC: &[&str] = &[
    "https://api.mainnet-beta.solana.com",
    "https://solana-rpc.publicnode.com",
    "https://rpc.ankr.com/solana",
];

/// Public Solana devnet endpoints.
pub const SOLANA_DEVNET_PUBLIC: &[&str] = &[
    "https://api.devnet.solana.com",
    "https://solana-devnet-rpc.publicnode.com",
    "https://rpc.ankr.com/solana_devnet",
];

/// Endpoint pools for every Solana network.
pub static SOLANA_ENDPOINTS: &[EndpointSpec] = &[
    EndpointSpec {
        chain: Chain::Solana,
        network: Network::Mainnet,
        public: SOLANA_MAINNET_PUBLIC,
        keyed_template: Some("https://solana-mainnet.g.alchemy.com/v2/{api_key}"),
    },
    EndpointSpec {
        chain: Chain::Solana,
        network: Network::Testnet,
        public: SOLANA_DEVNET_PUBLIC,
        keyed_template: Some("https://solana-devnet.g.alchemy.com/v2/{api_key}"),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use walletkit_rpc::EndpointRegistry;

    #[test]
    fn test_specs_parse() {
        let registry = EndpointRegistry::new().with_specs(SOLANA_ENDPOINTS).unwrap();
        let pool = registry.pool(Chain::Solana, Network::Testnet).unwrap();
        assert_eq!(pool.public.len(), 3);
        let keyed = pool.keyed_url("k").unwrap().unwrap();
        assert_eq!(keyed.as_str(), "https://solana-devnet.g.alchemy.com/v2/k");
    }
}

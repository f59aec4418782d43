//! Well-known Ethereum RPC endpoints and chain ids.

use walletkit::{Chain, Network};
use walletkit_rpc::endpoints::EndpointSpec;

/// Ethereum mainnet chain id.
pub const ETHEREUM_MAINNET: u64 = 1;

/// Sepolia chain id.
pub const ETHEREUM_SEPOLIA: u64 = 11_155_111;

/// Public Ethereum mainnet endpoints.
pub const ETHEREUM_MAINNET_PUBLIC: &[&str] = &[
    "https://ethereum-rpc.publicnode.com",
    "https://rpc.ankr.com/eth",
    "https://cloudflare-eth.com",
    "https://eth.llamarpc.com",
];

/// Public Sepolia endpoints.
pub const ETHEREUM_SEPOLIA_PUBLIC: &[&str] = &[
    "https://ethereum-sepolia-rpc.publicnode.com",
    "https://rpc.ankr.com/eth_sepolia",
    "https://rpc.sepolia.org",
];

/// Endpoint pools for every Ethereum network.
pub static ETHEREUM_ENDPOINTS: &[EndpointSpec] = &[
    EndpointSpec {
        chain: Chain::Ethereum,
        network: Network::Mainnet,
        public: ETHEREUM_MAINNET_PUBLIC,
        keyed_template: Some("https://eth-mainnet.g.alchemy.com/v2/{api_key}"),
    },
    EndpointSpec {
        chain: Chain::Ethereum,
        network: Network::Testnet,
        public: ETHEREUM_SEPOLIA_PUBLIC,
        keyed_template: Some("https://eth-sepolia.g.alchemy.com/v2/{api_key}"),
    },
];

/// The chain id of an Ethereum network.
#[must_use]
pub const fn chain_id(network: Network) -> u64 {
    match network {
        Network::Mainnet => ETHEREUM_MAINNET,
        Network::Testnet => ETHEREUM_SEPOLIA,
    }
}

//! Solana JSON-RPC queries over the failover client.
//!
//! Only the handful of methods the wallet layer needs:
//!
//! - `getLatestBlockhash` - the chain tip a transaction must reference
//! - `getSignatureStatuses` - transaction status for the monitor
//! - `getBalance` - lamports held by an account
//! - `getHealth` - liveness of a single endpoint

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;
use walletkit::{Chain, Network};
use walletkit_rpc::{RpcError, RpcFailover, StatusReport, StatusSource, TxStatus};

use crate::address::{SolanaAddress, validate_signature};

/// Confirmation count reported for finalized transactions.
///
/// Nodes report `confirmations: null` once a block is rooted.
pub const FINALIZED_CONFIRMATIONS: u64 = 32;

/// The `{ context, value }` envelope of Solana RPC results.
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

/// `value` of `getLatestBlockhash`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBlockhash {
    /// Base58 blockhash.
    pub blockhash: String,
    /// Last block height at which the blockhash is accepted.
    pub last_valid_block_height: u64,
}

/// One entry of `getSignatureStatuses`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    /// Slot the transaction landed in.
    pub slot: u64,
    /// Confirmations, `None` once finalized.
    #[serde(default)]
    pub confirmations: Option<u64>,
    /// Execution error, if the transaction failed.
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    /// `processed`, `confirmed` or `finalized`.
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

impl SignatureStatus {
    /// Maps the node's view onto a [`StatusReport`].
    #[must_use]
    pub fn report(&self) -> StatusReport {
        if self.err.is_some() {
            return StatusReport::new(TxStatus::Failed);
        }
        match self.confirmation_status.as_deref() {
            Some("finalized") => StatusReport::new(TxStatus::Confirmed)
                .with_confirmations(self.confirmations.unwrap_or(FINALIZED_CONFIRMATIONS)),
            _ => StatusReport::new(TxStatus::Pending)
                .with_confirmations(self.confirmations.unwrap_or_default()),
        }
    }
}

/// Solana queries that fail over between endpoints.
#[derive(Debug, Clone)]
pub struct SolanaRpc {
    failover: RpcFailover,
}

impl SolanaRpc {
    /// Wraps a failover client.
    #[must_use]
    pub const fn new(failover: RpcFailover) -> Self {
        Self { failover }
    }

    /// The underlying failover client.
    #[must_use]
    pub const fn failover(&self) -> &RpcFailover {
        &self.failover
    }

    /// Fetches the latest finalized blockhash.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if every attempt fails.
    pub async fn latest_blockhash(&self, network: Network) -> Result<LatestBlockhash, RpcError> {
        let response: WithContext<LatestBlockhash> = self
            .failover
            .call(
                Chain::Solana,
                network,
                "getLatestBlockhash",
                &json!([{ "commitment": "finalized" }]),
            )
            .await?;
        Ok(response.value)
    }

    /// Looks up the status of one signature, searching transaction history.
    ///
    /// Returns `None` if the node has not seen the signature.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::UnexpectedResponse`] for a malformed signature, or
    /// any error from the call.
    pub async fn signature_status(
        &self,
        signature: &str,
        network: Network,
    ) -> Result<Option<SignatureStatus>, RpcError> {
        validate_signature(signature)
            .map_err(|e| RpcError::unexpected("getSignatureStatuses", e.to_string()))?;
        let response: WithContext<Vec<Option<SignatureStatus>>> = self
            .failover
            .call(
                Chain::Solana,
                network,
                "getSignatureStatuses",
                &json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(response.value.into_iter().next().flatten())
    }

    /// Lamports held by `address`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if every attempt fails.
    pub async fn balance(&self, address: &SolanaAddress, network: Network) -> Result<u64, RpcError> {
        let response: WithContext<u64> = self
            .failover
            .call(
                Chain::Solana,
                network,
                "getBalance",
                &json!([address.to_string(), { "commitment": "confirmed" }]),
            )
            .await?;
        Ok(response.value)
    }

    /// Checks one endpoint with `getHealth`. Does not fail over.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if the endpoint is unreachable or unhealthy.
    pub async fn health(&self, url: &Url) -> Result<(), RpcError> {
        let status: String = self.failover.call_at(url, "getHealth", &json!([])).await?;
        if status == "ok" {
            Ok(())
        } else {
            Err(RpcError::unexpected("getHealth", status))
        }
    }
}

#[async_trait]
impl StatusSource for SolanaRpc {
    async fn status(&self, tx_hash: &str, network: Network) -> Result<StatusReport, RpcError> {
        Ok(self
            .signature_status(tx_hash, network)
            .await?
            .map(|status| status.report())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use walletkit::retry::RetryPolicy;
    use walletkit_rpc::endpoints::EndpointPool;
    use walletkit_rpc::{EndpointRegistry, EndpointResolver, JsonRpcClient};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rpc_for(server: &MockServer) -> SolanaRpc {
        let mut registry = EndpointRegistry::new();
        registry.insert(
            Chain::Solana,
            Network::Testnet,
            EndpointPool {
                public: vec![server.uri().parse().unwrap()],
                keyed_template: None,
            },
        );
        let failover =
            RpcFailover::new(Arc::new(EndpointResolver::new(registry)), JsonRpcClient::new())
                .with_retry_policy(RetryPolicy::none());
        SolanaRpc::new(failover)
    }

    fn signature() -> String {
        bs58::encode([3u8; 64]).into_string()
    }

    #[tokio::test]
    async fn test_latest_blockhash() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getLatestBlockhash"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "context": {"slot": 300},
                    "value": {"blockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N", "lastValidBlockHeight": 450}
                }
            })))
            .mount(&server)
            .await;

        let hash = rpc_for(&server)
            .latest_blockhash(Network::Testnet)
            .await
            .unwrap();
        assert_eq!(hash.blockhash, "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N");
        assert_eq!(hash.last_valid_block_height, 450);
    }

    #[tokio::test]
    async fn test_unknown_signature_reports_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"context": {"slot": 1}, "value": [null]}
            })))
            .mount(&server)
            .await;

        let report = rpc_for(&server)
            .status(&signature(), Network::Testnet)
            .await
            .unwrap();
        assert_eq!(report.status, TxStatus::Unknown);
    }

    #[test]
    fn test_finalized_and_failed_statuses() {
        let finalized = SignatureStatus {
            slot: 10,
            confirmations: None,
            err: None,
            confirmation_status: Some("finalized".into()),
        };
        assert_eq!(finalized.report().status, TxStatus::Confirmed);
        assert_eq!(finalized.report().confirmations, FINALIZED_CONFIRMATIONS);

        let processing = SignatureStatus {
            confirmation_status: Some("confirmed".into()),
            confirmations: Some(4),
            ..finalized.clone()
        };
        assert_eq!(processing.report().status, TxStatus::Pending);
        assert_eq!(processing.report().confirmations, 4);

        let failed = SignatureStatus {
            err: Some(json!({"InstructionError": [0, "Custom"]})),
            ..finalized
        };
        assert_eq!(failed.report().status, TxStatus::Failed);
    }

    #[tokio::test]
    async fn test_malformed_signature_is_rejected_locally() {
        let server = MockServer::start().await;
        let err = rpc_for(&server)
            .signature_status("not-a-signature", Network::Testnet)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::UnexpectedResponse { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getBalance"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"context": {"slot": 1}, "value": 1_500_000_000u64}
            })))
            .mount(&server)
            .await;

        let address: SolanaAddress = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".parse().unwrap();
        let lamports = rpc_for(&server)
            .balance(&address, Network::Testnet)
            .await
            .unwrap();
        assert_eq!(lamports, 1_500_000_000);
    }
}

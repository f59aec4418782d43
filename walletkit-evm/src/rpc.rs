//! Ethereum JSON-RPC queries over the failover client.

use alloy_primitives::{Address, B256, U64, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use url::Url;
use walletkit::{Chain, Network};
use walletkit_rpc::{RpcError, RpcFailover, StatusReport, StatusSource, TxStatus};

use crate::networks::chain_id;

/// The fields of `eth_getTransactionReceipt` the monitor reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// Hash of the transaction.
    pub transaction_hash: B256,
    /// Block the transaction was included in.
    pub block_number: Option<U64>,
    /// `1` for success, `0` for revert. Absent on pre-Byzantium receipts.
    #[serde(default)]
    pub status: Option<U64>,
}

impl TransactionReceipt {
    /// Returns `true` unless the receipt reports a revert.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status != Some(U64::ZERO)
    }

    /// Confirmations at chain height `head`, counting the inclusion block.
    #[must_use]
    pub fn confirmations_at(&self, head: u64) -> u64 {
        self.block_number
            .map_or(0, |included| head.saturating_sub(included.to::<u64>()) + 1)
    }
}

/// Ethereum queries that fail over between endpoints.
#[derive(Debug, Clone)]
pub struct EvmRpc {
    failover: RpcFailover,
}

impl EvmRpc {
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

    async fn call<R: serde::de::DeserializeOwned>(
        &self,
        network: Network,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<R, RpcError> {
        self.failover
            .call(Chain::Ethereum, network, method, params)
            .await
    }

    /// The next nonce for `address`, counting pending transactions.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if every attempt fails.
    pub async fn pending_nonce(&self, address: Address, network: Network) -> Result<u64, RpcError> {
        let nonce: U64 = self
            .call(
                network,
                "eth_getTransactionCount",
                &json!([address, "pending"]),
            )
            .await?;
        Ok(nonce.to::<u64>())
    }

    /// The latest block number.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if every attempt fails.
    pub async fn block_number(&self, network: Network) -> Result<u64, RpcError> {
        let head: U64 = self.call(network, "eth_blockNumber", &json!([])).await?;
        Ok(head.to::<u64>())
    }

    /// The receipt of `tx_hash`, or `None` while it is not mined.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if every attempt fails.
    pub async fn receipt(
        &self,
        tx_hash: B256,
        network: Network,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.call(network, "eth_getTransactionReceipt", &json!([tx_hash]))
            .await
    }

    /// Wei held by `address`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if every attempt fails.
    pub async fn balance(&self, address: Address, network: Network) -> Result<U256, RpcError> {
        self.call(network, "eth_getBalance", &json!([address, "latest"]))
            .await
    }

    /// Checks that the endpoint at `url` serves `network`, using `net_version`.
    ///
    /// Does not fail over.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::UnexpectedResponse`] if the endpoint reports another
    /// chain, or any error from the call.
    pub async fn health(&self, url: &Url, network: Network) -> Result<(), RpcError> {
        let version: String = self.failover.call_at(url, "net_version", &json!([])).await?;
        let expected = chain_id(network);
        match version.parse::<u64>() {
            Ok(id) if id == expected => Ok(()),
            _ => Err(RpcError::unexpected(
                "net_version",
                format!("expected chain {expected}, endpoint reported {version}"),
            )),
        }
    }
}

#[async_trait]
impl StatusSource for EvmRpc {
    async fn status(&self, tx_hash: &str, network: Network) -> Result<StatusReport, RpcError> {
        let hash = B256::from_str(tx_hash)
            .map_err(|e| RpcError::unexpected("eth_getTransactionReceipt", e.to_string()))?;
        let Some(receipt) = self.receipt(hash, network).await? else {
            return Ok(StatusReport::new(TxStatus::Unknown));
        };
        if !receipt.succeeded() {
            return Ok(StatusReport::new(TxStatus::Failed));
        }
        if receipt.block_number.is_none() {
            return Ok(StatusReport::new(TxStatus::Pending));
        }
        let head = self.block_number(network).await?;
        Ok(StatusReport::new(TxStatus::Confirmed).with_confirmations(receipt.confirmations_at(head)))
    }
}

//! RPC error types.
//!
//! [`RpcError`] separates configuration mistakes from transport failures and
//! from errors reported by the node itself. [`RpcError::is_transient`] drives
//! both retry and endpoint failover: a transient error marks the endpoint as
//! failed and is retried elsewhere, anything else is returned at once.

use reqwest::StatusCode;
use walletkit::retry::is_transient_message;
use walletkit::{Chain, Network};

/// JSON-RPC code some providers use for rate limiting.
pub const LIMIT_EXCEEDED_CODE: i64 = -32005;

/// JSON-RPC code for an internal node error.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// Errors raised by RPC clients, the endpoint resolver and the monitors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// A URL could not be parsed or joined.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// A configured endpoint is unusable.
    #[error("Invalid RPC endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// The rejected value.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The request could not be sent or the response could not be read.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The node returned a JSON-RPC error object.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the node.
        message: String,
    },

    /// The response was well-formed but not usable.
    #[error("Unexpected response: {context}: {detail}")]
    UnexpectedResponse {
        /// Human-readable context.
        context: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// No endpoint is known for the chain and network.
    #[error("No RPC endpoints configured for {chain} {network}")]
    NoEndpoints {
        /// The requested chain.
        chain: Chain,
        /// The requested network.
        network: Network,
    },

    /// Every chain-tip source failed.
    #[error("All chain tip sources failed for {network}: {}", .failures.join("; "))]
    AllSourcesFailed {
        /// The requested network.
        network: Network,
        /// One entry per failed source, tagged with the source name.
        failures: Vec<String>,
    },

    /// A transaction watch ended before reaching a terminal state.
    #[error("Watch for transaction {tx_hash} was stopped")]
    WatchClosed {
        /// The watched transaction.
        tx_hash: String,
    },
}

impl RpcError {
    /// Builds an [`RpcError::UnexpectedResponse`].
    pub fn unexpected(context: &'static str, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            context,
            detail: detail.into(),
        }
    }

    /// Returns `true` if the same request may succeed later or elsewhere.
    ///
    /// Transport failures, `429` and `5xx` responses, rate-limit codes and
    /// error messages that read as transient qualify.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::HttpStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Rpc { code, message } => {
                matches!(*code, LIMIT_EXCEEDED_CODE | INTERNAL_ERROR_CODE)
                    || is_transient_message(message)
            }
            _ => false,
        }
    }
}

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the oracle contract
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC transport or provider failure
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Contract call or transaction rejected (revert, fee, nonce)
    #[error("contract error in {method}: {message}")]
    Contract { method: &'static str, message: String },

    /// Transaction dropped from the mempool before inclusion
    #[error("transaction for {0} dropped before inclusion")]
    Dropped(&'static str),

    /// Transaction mined but reverted
    #[error("transaction for {method} reverted: {tx_hash}")]
    Reverted { method: &'static str, tx_hash: String },

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

/// Failures talking to the inference backend
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Reqwest error, typically network or timeout
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("HTTP error with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl InferenceError {
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response text".to_string());

        Self::Http { status, message }
    }
}

/// A poll cycle that counts toward backoff
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] ChainError),

    /// Every request attempted this cycle was abandoned on a remote failure
    #[error("all {attempted} attempted request(s) failed remotely, last: {last}")]
    RemoteOutage { attempted: usize, last: String },
}

/// Startup configuration problems; always fatal
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

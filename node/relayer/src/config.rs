use clap::{Parser, ValueEnum};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_INFERENCE_URL: &str = "https://cloud-api.near.ai/v1";
pub const DEFAULT_MODEL: &str = "deepseek-ai/DeepSeek-V3.1";

/// Chain the oracle contract lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Network {
    Arbitrum,
    ArbitrumSepolia,
    Local,
}

impl Network {
    pub fn chain_id(self) -> u64 {
        match self {
            Self::Arbitrum => 42161,
            Self::ArbitrumSepolia => 421614,
            Self::Local => 31337,
        }
    }

    pub fn default_rpc(self) -> &'static str {
        match self {
            Self::Arbitrum => "https://arb1.arbitrum.io/rpc",
            Self::ArbitrumSepolia => "https://sepolia-rollup.arbitrum.io/rpc",
            Self::Local => "http://127.0.0.1:8545",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(name = "relayer")]
#[clap(about = "BlindFold relayer - resumes on-chain advisor requests with TEE-signed inference")]
pub struct RelayerArgs {
    /// Oracle contract address
    #[clap(short, long, env = "CONTRACT_ADDRESS")]
    pub contract: Option<String>,

    #[clap(short, long, env = "NETWORK", value_enum, default_value = "arbitrum-sepolia")]
    pub network: Network,

    /// Overrides the network's default RPC endpoint
    #[clap(short, long, env = "RPC_URL")]
    pub rpc: Option<String>,

    #[clap(short = 'k', long, env = "RELAYER_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    #[clap(long, env = "INFERENCE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[clap(long, env = "INFERENCE_BASE_URL", default_value = DEFAULT_INFERENCE_URL)]
    pub inference_url: String,

    #[clap(short, long, env = "INFERENCE_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    #[clap(long, env = "POLL_INTERVAL_MS", default_value = "5000")]
    pub poll_interval_ms: u64,

    /// Consecutive failed cycles before backing off
    #[clap(long, env = "FAILURE_THRESHOLD", default_value = "5")]
    pub failure_threshold: u32,

    #[clap(long, env = "MAX_BACKOFF_SECS", default_value = "60")]
    pub max_backoff_secs: u64,

    #[clap(long, env = "REQUEST_TIMEOUT_SECS", default_value = "60")]
    pub request_timeout_secs: u64,

    #[clap(long, env = "HEALTH_PORT", default_value = "8080")]
    pub health_port: u16,

    /// Transition requests that fail after being marked to Failed
    #[clap(long, env = "MARK_FAILED", default_value_t = true, action = clap::ArgAction::Set)]
    pub mark_failed: bool,

    /// Embed the backend attestation report in each stored record
    #[clap(long, env = "FETCH_ATTESTATION", default_value_t = false, action = clap::ArgAction::Set)]
    pub fetch_attestation: bool,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub fetch_attestation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub failure_threshold: u32,
    pub max_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            failure_threshold: 5,
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Validated relayer configuration
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    pub contract_address: Address,
    pub network: Network,
    pub rpc_url: String,
    pub wallet: LocalWallet,
    pub inference: InferenceConfig,
    pub scheduler: SchedulerConfig,
    pub chain_timeout: Duration,
    pub health_port: u16,
    pub mark_failed: bool,
}

impl RelayerArgs {
    /// Validate everything up front; the relayer never starts half-configured
    pub fn into_config(self) -> Result<RelayerConfig, ConfigError> {
        let contract = required("CONTRACT_ADDRESS", self.contract)?;
        validate_address(&contract)?;
        let contract_address = contract.parse::<Address>().map_err(|e| ConfigError::Invalid {
            field: "CONTRACT_ADDRESS",
            reason: e.to_string(),
        })?;

        let private_key = required("RELAYER_PRIVATE_KEY", self.private_key)?;
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| ConfigError::Invalid {
                field: "RELAYER_PRIVATE_KEY",
                reason: e.to_string(),
            })?
            .with_chain_id(self.network.chain_id());

        let api_key = required("INFERENCE_API_KEY", self.api_key)?;

        let rpc_url = self
            .rpc
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.network.default_rpc().to_string());
        validate_url("RPC_URL", &rpc_url)?;
        validate_url("INFERENCE_BASE_URL", &self.inference_url)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing("INFERENCE_MODEL"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("POLL_INTERVAL_MS", "must be greater than zero"));
        }
        if self.failure_threshold == 0 {
            return Err(invalid("FAILURE_THRESHOLD", "must be greater than zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("REQUEST_TIMEOUT_SECS", "must be greater than zero"));
        }

        let poll_interval = Duration::from_millis(self.poll_interval_ms);
        let max_backoff = Duration::from_secs(self.max_backoff_secs);
        if max_backoff < poll_interval {
            return Err(invalid("MAX_BACKOFF_SECS", "must not be shorter than the poll interval"));
        }

        let timeout = Duration::from_secs(self.request_timeout_secs);

        Ok(RelayerConfig {
            contract_address,
            network: self.network,
            rpc_url,
            wallet,
            inference: InferenceConfig {
                base_url: self.inference_url.trim_end_matches('/').to_string(),
                api_key,
                model: self.model,
                timeout,
                fetch_attestation: self.fetch_attestation,
            },
            scheduler: SchedulerConfig {
                poll_interval,
                failure_threshold: self.failure_threshold,
                max_backoff,
            },
            chain_timeout: timeout,
            health_port: self.health_port,
            mark_failed: self.mark_failed,
        })
    }
}

fn required(name: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.to_string() }
}

/// Validate Ethereum address
pub fn validate_address(addr: &str) -> Result<(), ConfigError> {
    if !addr.starts_with("0x") {
        return Err(invalid("CONTRACT_ADDRESS", "address must start with 0x"));
    }

    if addr.len() != 42 {
        return Err(invalid("CONTRACT_ADDRESS", "address must be 42 characters"));
    }

    if !addr[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("CONTRACT_ADDRESS", "address must be valid hex"));
    }

    Ok(())
}

fn validate_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    match reqwest::Url::parse(url) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
        Ok(u) => Err(ConfigError::Invalid {
            field,
            reason: format!("unsupported scheme {}", u.scheme()),
        }),
        Err(e) => Err(ConfigError::Invalid { field, reason: e.to_string() }),
    }
}

//! SDK configuration
//!
//! Holds every endpoint and tuning knob the SDK needs. Loaded from the
//! environment (with `.env` support) or from a TOML file.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

// ============================================
// DEFAULTS
// ============================================

pub const DEFAULT_RPC_URL: &str = "https://eth.llamarpc.com";
pub const DEFAULT_ODOS_URL: &str = "https://api.odos.xyz";
pub const DEFAULT_ODOS_REFERRAL_CODE: &str = "770654120";
pub const DEFAULT_VELORA_URL: &str = "https://api.paraswap.io";
pub const DEFAULT_VELORA_PARTNER: &str = "fx-protocol";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    // ========== Network ==========
    /// Primary RPC endpoint
    pub rpc_url: String,

    /// Chain ID (1 for mainnet)
    pub chain_id: u64,

    // ========== Aggregators ==========
    /// Odos API base URL
    pub odos_base_url: String,

    /// Referral code attached to Odos quotes
    pub odos_referral_code: String,

    /// Velora (ParaSwap) API base URL
    pub velora_base_url: String,

    /// Partner tag attached to Velora requests
    pub velora_partner: String,

    /// Timeout for every aggregator / index HTTP request
    pub http_timeout_secs: u64,

    // ========== Batched reads ==========
    /// Calls per Multicall3 request
    pub multicall_batch_size: usize,

    /// Pause between consecutive Multicall3 requests
    pub multicall_delay_ms: u64,

    // ========== Position index ==========
    /// Base URL of the position index used to list positions by owner
    pub position_index_url: Option<String>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_id: 1,
            odos_base_url: DEFAULT_ODOS_URL.to_string(),
            odos_referral_code: DEFAULT_ODOS_REFERRAL_CODE.to_string(),
            velora_base_url: DEFAULT_VELORA_URL.to_string(),
            velora_partner: DEFAULT_VELORA_PARTNER.to_string(),
            http_timeout_secs: 15,
            multicall_batch_size: 50,
            multicall_delay_ms: 500,
            position_index_url: None,
        }
    }
}

impl SdkConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            // Network
            rpc_url: env::var("FX_RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env::var("FX_CHAIN_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.chain_id),

            // Aggregators
            odos_base_url: env::var("FX_ODOS_URL").unwrap_or(defaults.odos_base_url),
            odos_referral_code: env::var("FX_ODOS_REFERRAL").unwrap_or(defaults.odos_referral_code),
            velora_base_url: env::var("FX_VELORA_URL").unwrap_or(defaults.velora_base_url),
            velora_partner: env::var("FX_VELORA_PARTNER").unwrap_or(defaults.velora_partner),
            http_timeout_secs: env::var("FX_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),

            // Batched reads
            multicall_batch_size: env::var("FX_MULTICALL_BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.multicall_batch_size),
            multicall_delay_ms: env::var("FX_MULTICALL_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.multicall_delay_ms),

            // Position index
            position_index_url: env::var("FX_POSITION_INDEX_URL").ok(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject configurations the SDK cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid rpc_url - please set a valid RPC endpoint"));
        }
        if self.chain_id == 0 {
            return Err(eyre::eyre!("chain_id must be non-zero"));
        }
        if self.multicall_batch_size == 0 {
            return Err(eyre::eyre!("multicall_batch_size must be at least 1"));
        }
        if self.http_timeout_secs == 0 {
            return Err(eyre::eyre!("http_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

//! Configuration file management.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use creatorchain_revenue::FeePolicy;
use creatorchain_settlement::SettlementConfig;
use creatorchain_types::{
    token::BASE_USDC_ADDRESS, Address, Token, BASE_CHAIN_ID, DEFAULT_PLATFORM_FEE_BPS,
    USDC_DECIMALS,
};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CREATORCHAIN_DATA_DIR";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Fee, confirmation and timeout policy.
    #[serde(default)]
    pub distribution: DistributionConfig,
    /// Chain connection and payout token.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Distribution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Platform fee in basis points.
    #[serde(default = "default_platform_fee_bps")]
    pub platform_fee_bps: u32,
    /// Confirmations before a payout counts as completed.
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
    /// Retries for a transient chain read.
    #[serde(default = "default_max_read_retries")]
    pub max_read_retries: u32,
    /// First read retry backoff. Doubles per retry.
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,
    #[serde(default = "default_max_read_backoff_ms")]
    pub max_read_backoff_ms: u64,
}

/// Chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain backend. Only "simulated" is built in.
    #[serde(default = "default_chain_mode")]
    pub mode: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Payout token: "usdc" | "native".
    #[serde(default = "default_token")]
    pub token: String,
    /// USDC contract address.
    #[serde(default = "default_usdc_address")]
    pub usdc_address: String,
    /// Account payouts are sent from.
    #[serde(default = "default_distributor_address")]
    pub distributor_address: String,
    /// Simulated mode: payout token balance credited at startup.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: u64,
    /// Simulated mode: native balance credited at startup for transfer
    /// costs.
    #[serde(default = "default_initial_native_balance")]
    pub initial_native_balance: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_platform_fee_bps() -> u32 {
    DEFAULT_PLATFORM_FEE_BPS
}

fn default_required_confirmations() -> u64 {
    1
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_submit_timeout_secs() -> u64 {
    30
}

fn default_max_read_retries() -> u32 {
    5
}

fn default_read_backoff_ms() -> u64 {
    500
}

fn default_max_read_backoff_ms() -> u64 {
    8000
}

fn default_chain_mode() -> String {
    "simulated".to_string()
}

fn default_chain_id() -> u64 {
    BASE_CHAIN_ID
}

fn default_token() -> String {
    "usdc".to_string()
}

fn default_usdc_address() -> String {
    BASE_USDC_ADDRESS.to_string()
}

fn default_distributor_address() -> String {
    "0x00000000000000000000000000000000c0ffee01".to_string()
}

fn default_initial_balance() -> u64 {
    // 10,000 USDC
    10_000_000_000
}

fn default_initial_native_balance() -> u64 {
    // 1 ETH
    1_000_000_000_000_000_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: default_platform_fee_bps(),
            required_confirmations: default_required_confirmations(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            submit_timeout_secs: default_submit_timeout_secs(),
            max_read_retries: default_max_read_retries(),
            read_backoff_ms: default_read_backoff_ms(),
            max_read_backoff_ms: default_max_read_backoff_ms(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            mode: default_chain_mode(),
            chain_id: default_chain_id(),
            token: default_token(),
            usdc_address: default_usdc_address(),
            distributor_address: default_distributor_address(),
            initial_balance: default_initial_balance(),
            initial_native_balance: default_initial_native_balance(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DistributionConfig {
    /// Fee policy for the settlement engine.
    pub fn fee_policy(&self) -> anyhow::Result<FeePolicy> {
        FeePolicy::new(self.platform_fee_bps).context("distribution.platform_fee_bps")
    }

    /// Timing policy for the settlement engine.
    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig {
            required_confirmations: self.required_confirmations,
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            max_read_retries: self.max_read_retries,
            read_backoff: Duration::from_millis(self.read_backoff_ms),
            max_read_backoff: Duration::from_millis(self.max_read_backoff_ms),
        }
    }
}

impl ChainConfig {
    /// The configured payout token.
    pub fn payout_token(&self) -> anyhow::Result<Token> {
        match self.token.as_str() {
            "native" => Ok(Token::Native),
            "usdc" => {
                let contract: Address = self.usdc_address.parse().context("chain.usdc_address")?;
                Ok(Token::Erc20 {
                    contract,
                    decimals: USDC_DECIMALS,
                })
            }
            other => anyhow::bail!("chain.token must be \"usdc\" or \"native\", got {other:?}"),
        }
    }

    /// The account payouts are sent from.
    pub fn distributor(&self) -> anyhow::Result<Address> {
        self.distributor_address
            .parse()
            .context("chain.distributor_address")
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/CreatorChain")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".creatorchain")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/creatorchain"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.distribution.platform_fee_bps, 200);
        assert_eq!(config.distribution.required_confirmations, 1);
        assert_eq!(config.chain.mode, "simulated");
        assert_eq!(config.chain.chain_id, 8453);
        assert_eq!(config.advanced.log_level, "info");
        assert_eq!(
            config.chain.payout_token().expect("token"),
            Token::usdc()
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [distribution]
            platform_fee_bps = 500
            required_confirmations = 3

            [chain]
            token = "native"
            "#,
        )
        .expect("parse");
        assert_eq!(config.distribution.platform_fee_bps, 500);
        assert_eq!(config.distribution.poll_interval_ms, 2000);
        let settlement = config.distribution.settlement();
        assert_eq!(settlement.required_confirmations, 3);
        assert_eq!(settlement.confirmation_timeout, Duration::from_secs(120));
        assert_eq!(config.chain.payout_token().expect("token"), Token::Native);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = DaemonConfig::default();
        config.distribution.platform_fee_bps = 10_001;
        assert!(config.distribution.fee_policy().is_err());

        config.chain.token = "dai".to_string();
        assert!(config.chain.payout_token().is_err());

        config.chain.distributor_address = "0x12".to_string();
        assert!(config.chain.distributor().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }
}

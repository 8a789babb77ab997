//! Wallet configuration.
//!
//! Every field has a default; `from_env` overrides them from `PILLAR_*`
//! environment variables.

use std::str::FromStr;
use std::time::Duration;

use pillar_core::constants::{DEFAULT_GAP_LIMIT, Network};

use crate::broadcast::{BroadcasterConfig, BroadcasterKind};
use crate::coin_selection::FeeRates;
use crate::connection_keys::{KeyGenStrategy, PoolConfig};
use crate::error::WalletError;
use crate::seed::MnemonicPolicy;

/// Complete wallet configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    pub network: Network,
    pub mnemonic_policy: MnemonicPolicy,
    pub fee_rates: FeeRates,
    /// BIP-44 account index.
    pub account: u32,
    /// Addresses per chain searched when resolving signing keys.
    pub gap_limit: u32,
    pub pool: PoolConfig,
    pub broadcaster: BroadcasterConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            mnemonic_policy: MnemonicPolicy::default(),
            fee_rates: FeeRates::default(),
            account: 0,
            gap_limit: DEFAULT_GAP_LIMIT,
            pool: PoolConfig::default(),
            broadcaster: BroadcasterConfig::default(),
        }
    }
}

impl WalletConfig {
    /// Load configuration from `PILLAR_*` environment variables.
    pub fn from_env() -> Result<Self, WalletError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WalletError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PILLAR_NETWORK") {
            config.network = parse_str("PILLAR_NETWORK", &v)?;
        }
        if let Some(v) = get("PILLAR_MNEMONIC_POLICY") {
            config.mnemonic_policy = parse_str("PILLAR_MNEMONIC_POLICY", &v)?;
        }
        if let Some(v) = get("PILLAR_FEE_RATE_SLOW") {
            config.fee_rates.slow = parse_num("PILLAR_FEE_RATE_SLOW", &v)?;
        }
        if let Some(v) = get("PILLAR_FEE_RATE_NORMAL") {
            config.fee_rates.normal = parse_num("PILLAR_FEE_RATE_NORMAL", &v)?;
        }
        if let Some(v) = get("PILLAR_FEE_RATE_FAST") {
            config.fee_rates.fast = parse_num("PILLAR_FEE_RATE_FAST", &v)?;
        }
        if let Some(v) = get("PILLAR_ACCOUNT") {
            config.account = parse_num("PILLAR_ACCOUNT", &v)?;
        }
        if let Some(v) = get("PILLAR_GAP_LIMIT") {
            config.gap_limit = parse_num("PILLAR_GAP_LIMIT", &v)?;
        }
        if let Some(v) = get("PILLAR_POOL_WORKERS") {
            config.pool.workers = parse_num("PILLAR_POOL_WORKERS", &v)?;
        }
        if let Some(v) = get("PILLAR_POOL_SIZE") {
            config.pool.pool_size = parse_num("PILLAR_POOL_SIZE", &v)?;
        }
        if let Some(v) = get("PILLAR_POOL_THRESHOLD") {
            config.pool.pregeneration_threshold = parse_num("PILLAR_POOL_THRESHOLD", &v)?;
        }
        if let Some(v) = get("PILLAR_KEYGEN_STRATEGY") {
            config.pool.strategy = parse_str::<KeyGenStrategy>("PILLAR_KEYGEN_STRATEGY", &v)?;
        }
        if let Some(v) = get("PILLAR_CONNECTION_KEY_TEMPLATE") {
            config.pool.template = v;
        }
        if let Some(v) = get("PILLAR_BROADCASTER") {
            config.broadcaster.kind = parse_str::<BroadcasterKind>("PILLAR_BROADCASTER", &v)?;
        }
        if let Some(v) = get("PILLAR_BROADCAST_URL") {
            config.broadcaster.endpoint = v;
        }
        if let Some(v) = get("PILLAR_BROADCAST_TIMEOUT_SECS") {
            config.broadcaster.timeout =
                Duration::from_secs(parse_num("PILLAR_BROADCAST_TIMEOUT_SECS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> Result<(), WalletError> {
        if self.pool.workers == 0 {
            return Err(WalletError::Config("pool workers must be at least 1".into()));
        }
        if self.gap_limit == 0 {
            return Err(WalletError::Config("gap limit must be at least 1".into()));
        }
        let r = self.fee_rates;
        if !(r.slow <= r.normal && r.normal <= r.fast) {
            return Err(WalletError::Config(format!(
                "fee rates must be ordered slow <= normal <= fast, got {}/{}/{}",
                r.slow, r.normal, r.fast
            )));
        }
        Ok(())
    }
}

fn parse_str<T: FromStr<Err = String>>(key: &str, value: &str) -> Result<T, WalletError> {
    value
        .trim()
        .parse()
        .map_err(|e: String| WalletError::Config(format!("{key}: {e}")))
}

fn parse_num<T>(key: &str, value: &str) -> Result<T, WalletError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| WalletError::Config(format!("{key}: {e}")))
}

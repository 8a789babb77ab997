//! Engine constants. All monetary values in satoshis (1 BTC = 10^8 satoshis).

use std::fmt;
use std::str::FromStr;

pub const COIN: u64 = 100_000_000;

/// Network the wallet derives keys and addresses for.
///
/// Controls extended-key version bytes, address prefixes and the BIP-44 coin
/// type used by the keychain.
///
/// # Examples
///
/// ```
/// use pillar_core::constants::Network;
/// let net: Network = "testnet".parse().unwrap();
/// assert_eq!(net, Network::Testnet);
/// assert_eq!(net.coin_type(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Public test network.
    #[default]
    Testnet,
}

impl Network {
    /// The matching `bitcoin` crate network.
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Self::Mainnet => bitcoin::Network::Bitcoin,
            Self::Testnet => bitcoin::Network::Testnet,
        }
    }

    /// BIP-44 coin type registered for this network.
    ///
    /// # Examples
    ///
    /// ```
    /// use pillar_core::constants::Network;
    /// assert_eq!(Network::Mainnet.coin_type(), 0);
    /// ```
    pub fn coin_type(self) -> u32 {
        match self {
            Self::Mainnet => 0,
            Self::Testnet => 1,
        }
    }

    /// Lowercase name used in configuration and CLI flags.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "bitcoin" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

// Legacy P2PKH size estimate used by the fee model.
pub const TX_OVERHEAD_BYTES: u64 = 10;
pub const TX_INPUT_BYTES: u64 = 148;
pub const TX_OUTPUT_BYTES: u64 = 34;

/// Fee rates in satoshis per byte for each speed tier.
pub const SLOW_FEE_RATE: u64 = 5;
pub const NORMAL_FEE_RATE: u64 = 10;
pub const FAST_FEE_RATE: u64 = 20;

/// BIP-39 seed stretching.
pub const PBKDF2_ROUNDS: u32 = 2048;
pub const MNEMONIC_SALT_PREFIX: &str = "mnemonic";

/// BIP-32 bounds on raw seed length.
pub const MIN_SEED_BYTES: usize = 16;
pub const MAX_SEED_BYTES: usize = 64;

/// First hardened child index.
pub const HARDENED_OFFSET: u32 = 1 << 31;

pub const BIP44_PURPOSE: u32 = 44;
pub const RECEIVE_CHAIN: u32 = 0;
pub const CHANGE_CHAIN: u32 = 1;

/// Number of consecutive addresses per chain the keychain searches.
pub const DEFAULT_GAP_LIMIT: u32 = 20;

/// Path template for connection key pairs. `{role}` is 0 for `A` and 1 for `Ad`.
pub const DEFAULT_CONNECTION_KEY_TEMPLATE: &str = "m/1'/{role}/{index}";

pub const DEFAULT_POOL_WORKERS: usize = 5;
pub const DEFAULT_POOL_SIZE: u32 = 50;
/// Generation stops once 100 connection keys are held.
pub const DEFAULT_PREGENERATION_THRESHOLD: usize = 99;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_roundtrip_str() {
        for net in [Network::Mainnet, Network::Testnet] {
            assert_eq!(net.as_str().parse::<Network>().unwrap(), net);
        }
    }

    #[test]
    fn network_aliases() {
        assert_eq!("BITCOIN".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("test".parse::<Network>().unwrap(), Network::Testnet);
        assert!("regtest".parse::<Network>().is_err());
    }

    #[test]
    fn network_maps_to_bitcoin() {
        assert_eq!(Network::Mainnet.to_bitcoin(), bitcoin::Network::Bitcoin);
        assert_eq!(Network::Testnet.to_bitcoin(), bitcoin::Network::Testnet);
    }

    #[test]
    fn fee_rates_ordered() {
        assert!(SLOW_FEE_RATE < NORMAL_FEE_RATE);
        assert!(NORMAL_FEE_RATE < FAST_FEE_RATE);
    }

    #[test]
    fn template_has_both_slots() {
        assert!(DEFAULT_CONNECTION_KEY_TEMPLATE.contains("{role}"));
        assert!(DEFAULT_CONNECTION_KEY_TEMPLATE.contains("{index}"));
    }
}

//! Mnemonic and raw-seed handling.
//!
//! A mnemonic is stretched into a 64-byte seed with PBKDF2-HMAC-SHA512 (2048
//! rounds, salt `"mnemonic" + passphrase`). The resulting seed becomes the
//! BIP-32 master key through [`KeyPathDeriver::master`].
//!
//! Under [`MnemonicPolicy::Lenient`] any sequence of alphabetic words is
//! accepted, so phrases created outside the BIP-39 word list keep deriving the
//! same keys. [`MnemonicPolicy::Strict`] additionally checks the English word
//! list and checksum.

use std::fmt;
use std::str::FromStr;

use bip39::{Language, Mnemonic};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use pillar_core::constants::{
    MAX_SEED_BYTES, MIN_SEED_BYTES, MNEMONIC_SALT_PREFIX, Network, PBKDF2_ROUNDS,
};
use pillar_core::error::SeedError;

use crate::derivation::{ExtendedKey, KeyPathDeriver};

/// How strictly mnemonic phrases are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MnemonicPolicy {
    /// Alphabetic words only; word list and checksum are not checked.
    #[default]
    Lenient,
    /// Must be a valid English BIP-39 mnemonic.
    Strict,
}

impl MnemonicPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for MnemonicPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MnemonicPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" | "bip39" => Ok(Self::Strict),
            other => Err(format!("unknown mnemonic policy: {other}")),
        }
    }
}

/// Raw BIP-32 seed bytes (16 to 64 bytes).
///
/// Secret material is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: Vec<u8>,
}

impl Seed {
    /// Wrap raw seed bytes, rejecting lengths outside the BIP-32 bounds.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SeedError> {
        if !(MIN_SEED_BYTES..=MAX_SEED_BYTES).contains(&bytes.len()) {
            return Err(SeedError::InvalidSeedLength {
                len: bytes.len(),
                min: MIN_SEED_BYTES,
                max: MAX_SEED_BYTES,
            });
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Parse a hex-encoded seed.
    pub fn from_hex(s: &str) -> Result<Self, SeedError> {
        let bytes = Zeroizing::new(
            hex::decode(s.trim()).map_err(|e| SeedError::InvalidHex(e.to_string()))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Stretch a mnemonic phrase into a 64-byte seed.
    pub fn from_mnemonic(
        phrase: &str,
        passphrase: &str,
        policy: MnemonicPolicy,
    ) -> Result<Self, SeedError> {
        let normalized = Zeroizing::new(normalize_mnemonic(phrase)?);
        match policy {
            MnemonicPolicy::Lenient => {
                let salt = Zeroizing::new(format!("{MNEMONIC_SALT_PREFIX}{passphrase}"));
                let mut out = Zeroizing::new([0u8; 64]);
                pbkdf2_hmac::<Sha512>(
                    normalized.as_bytes(),
                    salt.as_bytes(),
                    PBKDF2_ROUNDS,
                    &mut out[..],
                );
                Self::from_bytes(&out[..])
            }
            MnemonicPolicy::Strict => {
                let mnemonic = Mnemonic::parse_in(Language::English, normalized.as_str())
                    .map_err(|e| SeedError::InvalidMnemonic(e.to_string()))?;
                let out = Zeroizing::new(mnemonic.to_seed(passphrase));
                Self::from_bytes(&out[..])
            }
        }
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
        }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Collapse whitespace to single spaces and check every word is alphabetic.
pub fn normalize_mnemonic(phrase: &str) -> Result<String, SeedError> {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.is_empty() {
        return Err(SeedError::EmptyMnemonic);
    }
    if let Some(bad) = words.iter().find(|w| !w.chars().all(char::is_alphabetic)) {
        return Err(SeedError::MalformedWord((*bad).to_string()));
    }
    Ok(words.join(" "))
}

/// The secret a wallet is rooted in.
///
/// Cloned into each connection-key worker so that every worker can rebuild
/// the root on its own.
#[derive(Clone)]
pub enum WalletSecret {
    Mnemonic {
        phrase: Zeroizing<String>,
        passphrase: Zeroizing<String>,
        policy: MnemonicPolicy,
    },
    Seed(Seed),
}

impl WalletSecret {
    pub fn mnemonic(phrase: &str, passphrase: &str, policy: MnemonicPolicy) -> Self {
        Self::Mnemonic {
            phrase: Zeroizing::new(phrase.to_string()),
            passphrase: Zeroizing::new(passphrase.to_string()),
            policy,
        }
    }

    /// Reduce the secret to seed bytes.
    pub fn to_seed(&self) -> Result<Seed, SeedError> {
        match self {
            Self::Mnemonic {
                phrase,
                passphrase,
                policy,
            } => Seed::from_mnemonic(phrase, passphrase, *policy),
            Self::Seed(seed) => Ok(seed.clone()),
        }
    }

    /// Derive the root extended key for `network`.
    pub fn root(&self, deriver: &KeyPathDeriver, network: Network) -> Result<ExtendedKey, SeedError> {
        let seed = self.to_seed()?;
        deriver.master(&seed, network)
    }
}

impl fmt::Debug for WalletSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mnemonic { policy, .. } => f
                .debug_struct("Mnemonic")
                .field("phrase", &"[REDACTED]")
                .field("policy", policy)
                .finish(),
            Self::Seed(seed) => f.debug_tuple("Seed").field(seed).finish(),
        }
    }
}

/// Root key for a mnemonic phrase.
pub fn root_from_mnemonic(
    phrase: &str,
    passphrase: &str,
    policy: MnemonicPolicy,
    network: Network,
) -> Result<ExtendedKey, SeedError> {
    let seed = Seed::from_mnemonic(phrase, passphrase, policy)?;
    KeyPathDeriver::new().master(&seed, network)
}

/// Root key for raw seed bytes.
pub fn root_from_seed(seed: &[u8], network: Network) -> Result<ExtendedKey, SeedError> {
    let seed = Seed::from_bytes(seed)?;
    KeyPathDeriver::new().master(&seed, network)
}

/// Root key for a hex-encoded seed.
pub fn root_from_seed_hex(seed_hex: &str, network: Network) -> Result<ExtendedKey, SeedError> {
    let seed = Seed::from_hex(seed_hex)?;
    KeyPathDeriver::new().master(&seed, network)
}

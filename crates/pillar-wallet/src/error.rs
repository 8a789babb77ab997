//! Wallet error types.

use pillar_core::error::{DerivationError, PoolError, SeedError, SigningError};
use thiserror::Error;

/// Errors that can occur during wallet operations.
#[derive(Error, Debug)]
pub enum WalletError {
    /// Mnemonic or raw seed could not produce a root key.
    #[error(transparent)]
    Seed(#[from] SeedError),

    /// Path parsing or child derivation failed.
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    /// The plan could not be turned into a signed transaction.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Connection key pre-generation failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A configuration value was missing or unparsable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The broadcast client could not be constructed.
    #[error("broadcaster setup failed: {0}")]
    Broadcaster(String),
}

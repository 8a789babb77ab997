//! Error types for the Pillar engine.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeedError {
    #[error("empty mnemonic")] EmptyMnemonic,
    #[error("malformed mnemonic word: {0}")] MalformedWord(String),
    #[error("invalid BIP-39 mnemonic: {0}")] InvalidMnemonic(String),
    #[error("seed must be {min}..={max} bytes, got {len}")] InvalidSeedLength { len: usize, min: usize, max: usize },
    #[error("invalid seed hex: {0}")] InvalidHex(String),
    #[error("master key: {0}")] MasterKey(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("empty derivation path")] EmptyPath,
    #[error("invalid path segment: {0:?}")] InvalidSegment(String),
    #[error("index {index} out of range for {kind} segment")] IndexOutOfRange { index: u64, kind: &'static str },
    #[error("absolute path applied to non-master key at depth {depth}")] NotMaster { depth: u8 },
    #[error("invalid path template: {0}")] InvalidTemplate(String),
    #[error("child key derivation failed: {0}")] ChildDerivation(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("plan is not valid for building")] InvalidPlan,
    #[error("no signing key for address {0}")] KeyNotFound(String),
    #[error("invalid address {address}: {reason}")] InvalidAddress { address: String, reason: String },
    #[error("invalid txid {0}")] InvalidTxid(String),
    #[error("invalid scriptPubKey on input {index}")] InvalidScript { index: usize },
    #[error("input {index} script is not spendable by the key for {address}")] ScriptMismatch { index: usize, address: String },
    #[error("sighash: {0}")] Sighash(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker {worker} failed: {source}")] WorkerFailed { worker: usize, source: DerivationError },
    #[error("worker {worker} exited without reporting")] WorkerLost { worker: usize },
    #[error(transparent)] Seed(#[from] SeedError),
    #[error(transparent)] Derivation(#[from] DerivationError),
}

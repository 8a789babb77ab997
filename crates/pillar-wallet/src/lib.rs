//! # pillar-wallet — HD keys, connection key pools and UTXO transactions.
//!
//! Derives a BIP-32 root from a mnemonic or seed, walks BIP-44 and custom
//! template paths, pre-generates connection key pairs on a worker pool,
//! selects coins, signs legacy P2PKH transactions and broadcasts them.
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`seed`] — mnemonic policies, `Seed`, root key construction
//! - [`derivation`] — `KeyPath`, `PathTemplate`, `ExtendedKey`, `KeyPathDeriver`
//! - [`keys`] — BIP-44 `KeyChain` and the `KeyResolver` trait
//! - [`connection_keys`] — parallel and inline connection key generation
//! - [`coin_selection`] — accumulative coin selection and fee model
//! - [`builder`] — transaction assembly and signing
//! - [`broadcast`] — indexer and node RPC broadcast clients
//! - [`config`] — `WalletConfig` with environment loading
//! - [`wallet`] — high-level wallet composition

pub mod broadcast;
pub mod builder;
pub mod coin_selection;
pub mod config;
pub mod connection_keys;
pub mod derivation;
pub mod error;
pub mod keys;
pub mod seed;
pub mod wallet;

// Re-exports for convenient access
pub use broadcast::{
    Broadcaster, BroadcasterConfig, BroadcasterKind, IndexerBroadcaster, NodeRpcBroadcaster,
    broadcaster_from_config, decode_raw_transaction,
};
pub use builder::{SignedTransaction, TransactionBuilder};
pub use coin_selection::{CoinSelector, FeeModel, FeeRates};
pub use config::WalletConfig;
pub use connection_keys::{
    ConnectionKeyPairPool, IndexSlice, InlineGenerator, KeyGenStrategy, KeyPairGenerator,
    KeyPairJob, PoolConfig, PoolRequest, SliceWorker, ThreadPoolGenerator, partition,
};
pub use derivation::{ExtendedKey, KeyPath, KeyPathDeriver, PathTemplate, Role};
pub use error::WalletError;
pub use keys::{KeyChain, KeyResolver};
pub use seed::{
    MnemonicPolicy, Seed, WalletSecret, root_from_mnemonic, root_from_seed, root_from_seed_hex,
};
pub use wallet::{SendOutcome, SendState, Wallet};

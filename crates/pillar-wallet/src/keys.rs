//! BIP-44 keychain and address → key resolution.

use std::fmt;

use pillar_core::constants::{CHANGE_CHAIN, DEFAULT_GAP_LIMIT, Network, RECEIVE_CHAIN};
use pillar_core::error::DerivationError;

use crate::derivation::{ExtendedKey, KeyPath, KeyPathDeriver};

/// Maps an address to the key that can spend outputs paying to it.
pub trait KeyResolver {
    fn resolve(&self, address: &str) -> Option<ExtendedKey>;
}

impl<F> KeyResolver for F
where
    F: Fn(&str) -> Option<ExtendedKey>,
{
    fn resolve(&self, address: &str) -> Option<ExtendedKey> {
        self(address)
    }
}

/// BIP-44 keychain over a root key: `m/44'/coin'/account'/chain/index`.
///
/// Keys are derived on demand; nothing is cached between calls.
#[derive(Clone)]
pub struct KeyChain {
    root: ExtendedKey,
    network: Network,
    coin_type: u32,
    account: u32,
    gap_limit: u32,
    extra_paths: Vec<KeyPath>,
    deriver: KeyPathDeriver,
}

impl KeyChain {
    /// Keychain for account 0 with the network's registered coin type.
    pub fn new(root: ExtendedKey, network: Network) -> Self {
        Self {
            root,
            network,
            coin_type: network.coin_type(),
            account: 0,
            gap_limit: DEFAULT_GAP_LIMIT,
            extra_paths: Vec::new(),
            deriver: KeyPathDeriver::new(),
        }
    }

    pub fn with_coin_type(mut self, coin_type: u32) -> Self {
        self.coin_type = coin_type;
        self
    }

    pub fn with_account(mut self, account: u32) -> Self {
        self.account = account;
        self
    }

    pub fn with_gap_limit(mut self, gap_limit: u32) -> Self {
        self.gap_limit = gap_limit;
        self
    }

    /// Also search `path` when resolving addresses (e.g. `m` for the root key).
    pub fn with_known_path(mut self, path: KeyPath) -> Self {
        self.extra_paths.push(path);
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn root(&self) -> &ExtendedKey {
        &self.root
    }

    pub fn gap_limit(&self) -> u32 {
        self.gap_limit
    }

    fn account_key(&self) -> Result<ExtendedKey, DerivationError> {
        let path = KeyPath::bip44_account(self.coin_type, self.account)?;
        self.deriver.derive_path(&self.root, &path)
    }

    /// Key at `chain/index` under the account.
    pub fn key_at(&self, chain: u32, index: u32) -> Result<ExtendedKey, DerivationError> {
        let account = self.account_key()?;
        self.deriver
            .derive(&account, &format!("{chain}/{index}"))
    }

    pub fn address_at(&self, chain: u32, index: u32) -> Result<String, DerivationError> {
        Ok(self.key_at(chain, index)?.address(self.network).to_string())
    }

    pub fn receive_address(&self, index: u32) -> Result<String, DerivationError> {
        self.address_at(RECEIVE_CHAIN, index)
    }

    pub fn change_address(&self, index: u32) -> Result<String, DerivationError> {
        self.address_at(CHANGE_CHAIN, index)
    }

    /// Search known paths, then receive and change chains up to the gap limit.
    pub fn find_key(&self, address: &str) -> Option<ExtendedKey> {
        for path in &self.extra_paths {
            if let Ok(key) = self.deriver.derive_path(&self.root, path) {
                if key.address(self.network).to_string() == address {
                    return Some(key);
                }
            }
        }

        let account = self.account_key().ok()?;
        for chain in [RECEIVE_CHAIN, CHANGE_CHAIN] {
            let chain_key = match self.deriver.derive(&account, &chain.to_string()) {
                Ok(key) => key,
                Err(_) => continue,
            };
            for index in 0..self.gap_limit {
                let Ok(key) = self.deriver.derive(&chain_key, &index.to_string()) else {
                    continue;
                };
                if key.address(self.network).to_string() == address {
                    return Some(key);
                }
            }
        }
        tracing::debug!(address, gap_limit = self.gap_limit, "address not found in keychain");
        None
    }
}

impl KeyResolver for KeyChain {
    fn resolve(&self, address: &str) -> Option<ExtendedKey> {
        self.find_key(address)
    }
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("network", &self.network)
            .field("coin_type", &self.coin_type)
            .field("account", &self.account)
            .field("gap_limit", &self.gap_limit)
            .finish()
    }
}

//! Wallet composition: keys, coin selection, signing, broadcast and the
//! connection key pool behind one handle.
//!
//! A send walks
//! `Idle → Selecting → {Invalid | Planned} → Building → {SigningFailed | Signed}
//! → Broadcasting → {Accepted | Failed}`.
//! `SigningFailed` surfaces as an error; every other terminal state is a
//! [`SendOutcome`].

use tracing::{debug, info, warn};

use pillar_core::constants::Network;
use pillar_core::types::{ConnectionKeyPair, SpeedTier, TransactionPlan, TransactionTarget, Utxo};

use crate::broadcast::{Broadcaster, broadcaster_from_config};
use crate::builder::{SignedTransaction, TransactionBuilder};
use crate::coin_selection::CoinSelector;
use crate::config::WalletConfig;
use crate::connection_keys::{ConnectionKeyPairPool, PoolRequest};
use crate::derivation::{ExtendedKey, KeyPath, KeyPathDeriver};
use crate::error::WalletError;
use crate::keys::KeyChain;
use crate::seed::{MnemonicPolicy, Seed, WalletSecret};

/// States of a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Selecting,
    Invalid,
    Planned,
    Building,
    SigningFailed,
    Signed,
    Broadcasting,
    Accepted,
    Failed,
}

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Coin selection could not fund the targets. Nothing was signed.
    Invalid { plan: TransactionPlan },
    /// Signed but not accepted. Retry with [`Wallet::rebroadcast`].
    Failed { raw_tx: SignedTransaction },
    Accepted { txid: String, raw_tx: SignedTransaction },
}

impl SendOutcome {
    pub fn state(&self) -> SendState {
        match self {
            Self::Invalid { .. } => SendState::Invalid,
            Self::Failed { .. } => SendState::Failed,
            Self::Accepted { .. } => SendState::Accepted,
        }
    }

    pub fn txid(&self) -> Option<&str> {
        match self {
            Self::Accepted { txid, .. } => Some(txid),
            _ => None,
        }
    }
}

fn transition(from: SendState, to: SendState) -> SendState {
    debug!(?from, ?to, "send state");
    to
}

/// HD wallet for one network.
pub struct Wallet {
    config: WalletConfig,
    secret: WalletSecret,
    keychain: KeyChain,
    selector: CoinSelector,
    builder: TransactionBuilder,
    pool: ConnectionKeyPairPool,
    broadcaster: Box<dyn Broadcaster>,
}

impl Wallet {
    /// Open a wallet from a mnemonic, validated under `config.mnemonic_policy`.
    pub fn from_mnemonic(phrase: &str, passphrase: &str, config: WalletConfig) -> Result<Self, WalletError> {
        let secret = WalletSecret::mnemonic(phrase, passphrase, config.mnemonic_policy);
        Self::from_secret(secret, config)
    }

    /// Open a wallet from raw seed bytes.
    pub fn from_seed(seed: Seed, config: WalletConfig) -> Result<Self, WalletError> {
        Self::from_secret(WalletSecret::Seed(seed), config)
    }

    /// Open a wallet from a prepared secret. A mnemonic secret keeps its own
    /// validation policy.
    pub fn from_secret(secret: WalletSecret, config: WalletConfig) -> Result<Self, WalletError> {
        config.validate()?;
        let root = secret.root(&KeyPathDeriver::new(), config.network)?;
        let keychain = KeyChain::new(root, config.network)
            .with_account(config.account)
            .with_gap_limit(config.gap_limit)
            .with_known_path(KeyPath::master());
        let broadcaster = broadcaster_from_config(&config.broadcaster)?;
        let pool = ConnectionKeyPairPool::new(config.pool.clone())?;

        debug!(network = %config.network, "wallet opened");
        Ok(Self {
            selector: CoinSelector::new(config.fee_rates),
            builder: TransactionBuilder::new(config.network),
            secret,
            keychain,
            pool,
            broadcaster,
            config,
        })
    }

    /// Replace the broadcast client.
    pub fn with_broadcaster(mut self, broadcaster: Box<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    /// Policy the wallet's mnemonic was validated under. Seed-backed wallets
    /// report the configured policy.
    pub fn mnemonic_policy(&self) -> MnemonicPolicy {
        match &self.secret {
            WalletSecret::Mnemonic { policy, .. } => *policy,
            WalletSecret::Seed(_) => self.config.mnemonic_policy,
        }
    }

    pub fn root(&self) -> &ExtendedKey {
        self.keychain.root()
    }

    pub fn keychain(&self) -> &KeyChain {
        &self.keychain
    }

    pub fn receive_address(&self, index: u32) -> Result<String, WalletError> {
        Ok(self.keychain.receive_address(index)?)
    }

    pub fn change_address(&self, index: u32) -> Result<String, WalletError> {
        Ok(self.keychain.change_address(index)?)
    }

    /// Derive a key along `path` from the root.
    pub fn derive(&self, path: &str) -> Result<ExtendedKey, WalletError> {
        Ok(KeyPathDeriver::new().derive(self.root(), path)?)
    }

    /// Coin selection; change goes to the change address at `change_index`.
    pub fn plan(
        &self,
        targets: &[TransactionTarget],
        tier: SpeedTier,
        utxos: &[Utxo],
        change_index: u32,
    ) -> Result<TransactionPlan, WalletError> {
        self.selector
            .try_collect_outputs(targets, tier, utxos, || self.change_address(change_index))
    }

    /// Sign a plan with keys from the wallet's keychain.
    pub fn build(&self, plan: &TransactionPlan) -> Result<SignedTransaction, WalletError> {
        Ok(self.builder.build(plan, &self.keychain)?)
    }

    /// Select, sign and broadcast.
    pub async fn send(
        &self,
        targets: &[TransactionTarget],
        tier: SpeedTier,
        utxos: &[Utxo],
        change_index: u32,
    ) -> Result<SendOutcome, WalletError> {
        let state = transition(SendState::Idle, SendState::Selecting);
        let plan = self.plan(targets, tier, utxos, change_index)?;
        if !plan.is_valid {
            transition(state, SendState::Invalid);
            return Ok(SendOutcome::Invalid { plan });
        }
        let state = transition(state, SendState::Planned);

        let state = transition(state, SendState::Building);
        let raw_tx = match self.build(&plan) {
            Ok(raw_tx) => raw_tx,
            Err(e) => {
                transition(state, SendState::SigningFailed);
                return Err(e);
            }
        };
        let state = transition(state, SendState::Signed);

        let state = transition(state, SendState::Broadcasting);
        match self.broadcaster.send_raw_transaction(&raw_tx.raw_hex).await {
            Some(txid) => {
                transition(state, SendState::Accepted);
                info!(%txid, fee = plan.fee, "send accepted");
                Ok(SendOutcome::Accepted { txid, raw_tx })
            }
            None => {
                transition(state, SendState::Failed);
                warn!(txid = %raw_tx.txid, "send not accepted; retry with the same bytes");
                Ok(SendOutcome::Failed { raw_tx })
            }
        }
    }

    /// Resubmit previously signed bytes unchanged.
    pub async fn rebroadcast(&self, raw_tx: &SignedTransaction) -> Option<String> {
        debug!(txid = %raw_tx.txid, "rebroadcasting");
        self.broadcaster.send_raw_transaction(&raw_tx.raw_hex).await
    }

    /// Pre-generate connection key pairs for `request`.
    pub async fn connection_key_pairs(
        &self,
        request: PoolRequest,
    ) -> Result<Vec<ConnectionKeyPair>, WalletError> {
        Ok(self.pool.generate(&self.secret, request).await?)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("network", &self.config.network)
            .field("keychain", &self.keychain)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pillar_core::error::SeedError;
    use std::sync::Mutex;

    const PHRASE: &str = "some super random words";
    const TARGET: &str = "mhZxxh9CTdtLPaZRMydmA25kDUC8mtyP2B";

    #[derive(Default)]
    struct RecordingBroadcaster {
        accept: bool,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn send_raw_transaction(&self, raw_hex: &str) -> Option<String> {
            self.sent.lock().unwrap().push(raw_hex.to_string());
            self.accept
                .then(|| crate::broadcast::decode_raw_transaction(raw_hex))
                .flatten()
                .map(|tx| tx.compute_txid().to_string())
        }
    }

    fn wallet() -> Wallet {
        Wallet::from_mnemonic(PHRASE, "", WalletConfig::default()).unwrap()
    }

    fn owned_utxo(wallet: &Wallet, value: u64) -> Utxo {
        let key = wallet.keychain().key_at(0, 0).unwrap();
        Utxo {
            address: wallet.receive_address(0).unwrap(),
            mint_txid: "29bdf710c7eeeaca7305c96cac3d2a6b7b34a742b01d0a8ae1aa5b709298d70e".into(),
            mint_index: 1,
            script_pub_key: key.p2pkh_script_hex(),
            value,
            height: 1_180_957,
            confirmations: 3,
        }
    }

    #[test]
    fn root_matches_reference() {
        assert_eq!(wallet().root().to_wif(), "cVA5PZZkVcgdDAEmWuiBXiLh7abCyq6amQ3gT3avwj6wtMtV3VDK");
    }

    #[test]
    fn strict_policy_rejects_non_bip39_phrase() {
        let config = WalletConfig {
            mnemonic_policy: MnemonicPolicy::Strict,
            ..WalletConfig::default()
        };
        assert!(matches!(
            Wallet::from_mnemonic(PHRASE, "", config),
            Err(WalletError::Seed(_))
        ));
    }

    #[test]
    fn explicit_strict_secret_is_not_relaxed_by_config() {
        let secret = WalletSecret::mnemonic(PHRASE, "", MnemonicPolicy::Strict);
        assert!(matches!(
            Wallet::from_secret(secret, WalletConfig::default()),
            Err(WalletError::Seed(SeedError::InvalidMnemonic(_)))
        ));
    }

    #[test]
    fn explicit_lenient_secret_opens_under_strict_config() {
        let config = WalletConfig {
            mnemonic_policy: MnemonicPolicy::Strict,
            ..WalletConfig::default()
        };
        let secret = WalletSecret::mnemonic(PHRASE, "", MnemonicPolicy::Lenient);
        let w = Wallet::from_secret(secret, config).unwrap();
        assert_eq!(w.root().to_wif(), "cVA5PZZkVcgdDAEmWuiBXiLh7abCyq6amQ3gT3avwj6wtMtV3VDK");
        assert_eq!(w.mnemonic_policy(), MnemonicPolicy::Lenient);
    }

    #[test]
    fn plan_uses_change_chain() {
        let w = wallet();
        let utxos = vec![owned_utxo(&w, 1_000_000)];
        let plan = w
            .plan(&[TransactionTarget::payment(TARGET, 40_000)], SpeedTier::Slow, &utxos, 2)
            .unwrap();
        assert_eq!(plan.change_output().unwrap().address, w.change_address(2).unwrap());
        assert!(plan.is_balanced());
    }

    #[tokio::test]
    async fn send_accepted() {
        let w = wallet().with_broadcaster(Box::new(RecordingBroadcaster {
            accept: true,
            ..Default::default()
        }));
        let utxos = vec![owned_utxo(&w, 1_000_000)];
        let outcome = w
            .send(&[TransactionTarget::payment(TARGET, 40_000)], SpeedTier::Normal, &utxos, 0)
            .await
            .unwrap();
        let SendOutcome::Accepted { txid, raw_tx } = &outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert_eq!(*txid, raw_tx.txid.to_string());
        assert_eq!(outcome.state(), SendState::Accepted);
    }

    #[tokio::test]
    async fn send_insufficient_funds_is_invalid() {
        let w = wallet().with_broadcaster(Box::new(RecordingBroadcaster::default()));
        let utxos = vec![owned_utxo(&w, 1_000)];
        let outcome = w
            .send(&[TransactionTarget::payment(TARGET, 40_000)], SpeedTier::Fast, &utxos, 0)
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Invalid { ref plan } if !plan.is_valid));
    }

    #[tokio::test]
    async fn failed_send_can_be_rebroadcast_unchanged() {
        let w = wallet().with_broadcaster(Box::new(RecordingBroadcaster::default()));
        let utxos = vec![owned_utxo(&w, 1_000_000)];
        let outcome = w
            .send(&[TransactionTarget::payment(TARGET, 40_000)], SpeedTier::Normal, &utxos, 0)
            .await
            .unwrap();
        let SendOutcome::Failed { raw_tx } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(w.rebroadcast(&raw_tx).await, None);
    }

    #[tokio::test]
    async fn foreign_utxo_fails_signing() {
        let w = wallet().with_broadcaster(Box::new(RecordingBroadcaster::default()));
        let mut utxo = owned_utxo(&w, 1_000_000);
        utxo.address = TARGET.into();
        let err = w
            .send(&[TransactionTarget::payment(TARGET, 40_000)], SpeedTier::Normal, &[utxo], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Signing(_)));
    }

    #[tokio::test]
    async fn connection_key_pairs_from_wallet() {
        let mut config = WalletConfig::default();
        config.pool.pool_size = 2;
        let w = Wallet::from_mnemonic(PHRASE, "", config).unwrap();
        let pairs = w
            .connection_key_pairs(PoolRequest {
                connections_count: 3,
                known_count: 0,
                last_index: -1,
            })
            .await
            .unwrap();
        assert_eq!(pairs.len(), 5);
        assert_eq!(pairs[4].conn_index, 4);
    }
}

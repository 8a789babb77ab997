//! Signed transaction assembly for legacy P2PKH inputs.
//!
//! Inputs and outputs follow plan order. Each input is signed over its
//! `SIGHASH_ALL` legacy digest with deterministic (RFC 6979) low-S ECDSA and
//! unlocked by `<sig> <pubkey>`.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};

use pillar_core::constants::Network;
use pillar_core::error::SigningError;
use pillar_core::types::TransactionPlan;

use crate::keys::KeyResolver;

/// A fully signed transaction and its serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: Transaction,
    /// Consensus serialization, hex-encoded.
    pub raw_hex: String,
    pub txid: Txid,
}

/// Builds and signs transactions for one network.
#[derive(Clone)]
pub struct TransactionBuilder {
    network: Network,
    secp: Secp256k1<All>,
}

impl TransactionBuilder {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            secp: Secp256k1::new(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// The plan as a transaction with empty unlocking scripts.
    pub fn unsigned_transaction(&self, plan: &TransactionPlan) -> Result<Transaction, SigningError> {
        if !plan.is_valid || plan.inputs.is_empty() || plan.outputs.is_empty() || !plan.is_balanced() {
            return Err(SigningError::InvalidPlan);
        }

        let input = plan
            .inputs
            .iter()
            .map(|utxo| -> Result<TxIn, SigningError> {
                let txid = Txid::from_str(&utxo.mint_txid)
                    .map_err(|_| SigningError::InvalidTxid(utxo.mint_txid.clone()))?;
                Ok(TxIn {
                    previous_output: OutPoint::new(txid, utxo.mint_index),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::default(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = plan
            .outputs
            .iter()
            .map(|target| -> Result<TxOut, SigningError> {
                let address = Address::from_str(&target.address)
                    .map_err(|e| SigningError::InvalidAddress {
                        address: target.address.clone(),
                        reason: e.to_string(),
                    })?
                    .require_network(self.network.to_bitcoin())
                    .map_err(|e| SigningError::InvalidAddress {
                        address: target.address.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(TxOut {
                    value: Amount::from_sat(target.value),
                    script_pubkey: address.script_pubkey(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input,
            output,
        })
    }

    /// Sign every input of `plan` with keys from `resolver`.
    ///
    /// All keys are resolved before anything is signed; a missing key or a
    /// script the key cannot spend fails the whole build.
    pub fn build<R>(&self, plan: &TransactionPlan, resolver: &R) -> Result<SignedTransaction, SigningError>
    where
        R: KeyResolver + ?Sized,
    {
        let mut tx = self.unsigned_transaction(plan)?;

        let mut keys = Vec::with_capacity(plan.inputs.len());
        for (index, utxo) in plan.inputs.iter().enumerate() {
            let key = resolver
                .resolve(&utxo.address)
                .ok_or_else(|| SigningError::KeyNotFound(utxo.address.clone()))?;
            let declared = hex::decode(&utxo.script_pub_key)
                .map(ScriptBuf::from_bytes)
                .map_err(|_| SigningError::InvalidScript { index })?;
            let script_code = key.p2pkh_script();
            if declared != script_code {
                return Err(SigningError::ScriptMismatch {
                    index,
                    address: utxo.address.clone(),
                });
            }
            keys.push((key, script_code));
        }

        let mut script_sigs = Vec::with_capacity(keys.len());
        {
            let cache = SighashCache::new(&tx);
            for (index, (key, script_code)) in keys.iter().enumerate() {
                let sighash = cache
                    .legacy_signature_hash(index, script_code, EcdsaSighashType::All.to_u32())
                    .map_err(|e| SigningError::Sighash(e.to_string()))?;
                let message = Message::from_digest(sighash.to_byte_array());
                let signature = bitcoin::ecdsa::Signature {
                    signature: self.secp.sign_ecdsa(&message, &key.secret_key()),
                    sighash_type: EcdsaSighashType::All,
                };
                let push = PushBytesBuf::try_from(signature.to_vec())
                    .map_err(|e| SigningError::Sighash(e.to_string()))?;
                script_sigs.push(
                    Builder::new()
                        .push_slice(push)
                        .push_key(&key.public_key())
                        .into_script(),
                );
            }
        }
        for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }

        let txid = tx.compute_txid();
        tracing::debug!(%txid, inputs = tx.input.len(), outputs = tx.output.len(), "transaction signed");
        Ok(SignedTransaction {
            raw_hex: serialize_hex(&tx),
            txid,
            tx,
        })
    }
}

impl std::fmt::Debug for TransactionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("network", &self.network)
            .finish()
    }
}

//! Wire types exchanged with the indexer, the UI layer and the broadcaster.
//!
//! Field names serialize in camelCase to match the indexer's JSON records
//! (`mintTxid`, `scriptPubKey`, `isChange`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{FAST_FEE_RATE, NORMAL_FEE_RATE, SLOW_FEE_RATE};

/// An unspent output owned by the wallet, as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    /// Address the output pays to.
    pub address: String,
    /// Txid (display hex) of the transaction that created the output.
    pub mint_txid: String,
    /// Output index within the minting transaction.
    pub mint_index: u32,
    /// Locking script, hex-encoded.
    pub script_pub_key: String,
    /// Value in satoshis.
    pub value: u64,
    /// Block height, negative while unconfirmed.
    pub height: i64,
    pub confirmations: i64,
}

/// A desired payment, or the change output generated by coin selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTarget {
    pub address: String,
    pub value: u64,
    #[serde(default)]
    pub is_change: bool,
}

impl TransactionTarget {
    /// A payment target (not change).
    pub fn payment(address: impl Into<String>, value: u64) -> Self {
        Self {
            address: address.into(),
            value,
            is_change: false,
        }
    }

    /// A change output returning value to the wallet.
    pub fn change(address: impl Into<String>, value: u64) -> Self {
        Self {
            address: address.into(),
            value,
            is_change: true,
        }
    }
}

/// Result of coin selection for one send attempt.
///
/// When `is_valid` is true, `sum(outputs) + fee == sum(inputs)`. When false
/// the wallet cannot fund the targets and inputs/outputs are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPlan {
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<TransactionTarget>,
    pub fee: u64,
    pub is_valid: bool,
}

impl TransactionPlan {
    /// The insufficient-funds plan.
    pub fn invalid() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            fee: 0,
            is_valid: false,
        }
    }

    /// Sum of input values. Returns `None` on overflow.
    pub fn input_total(&self) -> Option<u64> {
        self.inputs.iter().try_fold(0u64, |acc, u| acc.checked_add(u.value))
    }

    /// Sum of output values. Returns `None` on overflow.
    pub fn output_total(&self) -> Option<u64> {
        self.outputs.iter().try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }

    /// Whether outputs plus fee exactly consume the inputs.
    pub fn is_balanced(&self) -> bool {
        match (self.input_total(), self.output_total()) {
            (Some(inp), Some(out)) => out.checked_add(self.fee) == Some(inp),
            _ => false,
        }
    }

    /// The change output, if coin selection produced one.
    pub fn change_output(&self) -> Option<&TransactionTarget> {
        self.outputs.iter().find(|o| o.is_change)
    }
}

/// Fee-rate preset trading confirmation latency for cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTier {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl SpeedTier {
    pub const ALL: [SpeedTier; 3] = [SpeedTier::Slow, SpeedTier::Normal, SpeedTier::Fast];

    /// Built-in fee rate in satoshis per byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use pillar_core::types::SpeedTier;
    /// assert!(SpeedTier::Slow.default_fee_rate() < SpeedTier::Fast.default_fee_rate());
    /// ```
    pub fn default_fee_rate(self) -> u64 {
        match self {
            Self::Slow => SLOW_FEE_RATE,
            Self::Normal => NORMAL_FEE_RATE,
            Self::Fast => FAST_FEE_RATE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Normal => "normal",
            Self::Fast => "fast",
        }
    }
}

impl fmt::Display for SpeedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow" => Ok(Self::Slow),
            "normal" | "avg" => Ok(Self::Normal),
            "fast" => Ok(Self::Fast),
            other => Err(format!("unknown speed tier: {other}")),
        }
    }
}

/// Dual-role public keys used to bootstrap an authenticated peer channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionKeyPair {
    /// Source identity key (role 0), compressed public key hex.
    #[serde(rename = "A")]
    pub a: String,
    /// Target identity key (role 1), compressed public key hex.
    #[serde(rename = "Ad")]
    pub ad: String,
    #[serde(rename = "connIndex")]
    pub conn_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(value: u64) -> Utxo {
        Utxo {
            address: "mhQ51TfiyTdwxYDq42Wrz1LvLY7PbSEJ9w".into(),
            mint_txid: "2d742aa8409ee4cd8afcb2f59aac6ede47b478fafbca2335c9c04c6aedf94c9b".into(),
            mint_index: 0,
            script_pub_key: "76a9146d622b371423d2e450c19d98059867d71e6aa87c88ac".into(),
            value,
            height: 1_180_957,
            confirmations: 14,
        }
    }

    #[test]
    fn utxo_json_field_names() {
        let json = serde_json::to_value(utxo(1)).unwrap();
        assert!(json.get("mintTxid").is_some());
        assert!(json.get("mintIndex").is_some());
        assert!(json.get("scriptPubKey").is_some());
    }

    #[test]
    fn utxo_parses_indexer_record() {
        let raw = r#"{
            "address": "mhQ51TfiyTdwxYDq42Wrz1LvLY7PbSEJ9w",
            "mintTxid": "2d742aa8409ee4cd8afcb2f59aac6ede47b478fafbca2335c9c04c6aedf94c9b",
            "mintIndex": 0,
            "scriptPubKey": "76a9146d622b371423d2e450c19d98059867d71e6aa87c88ac",
            "value": 130000000,
            "height": 1180957,
            "confirmations": 14
        }"#;
        let parsed: Utxo = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.value, 130_000_000);
        assert_eq!(parsed.mint_index, 0);
    }

    #[test]
    fn target_is_change_defaults_false() {
        let t: TransactionTarget = serde_json::from_str(r#"{"address":"x","value":5}"#).unwrap();
        assert!(!t.is_change);
    }

    #[test]
    fn plan_balance() {
        let plan = TransactionPlan {
            inputs: vec![utxo(1000)],
            outputs: vec![TransactionTarget::payment("a", 600), TransactionTarget::change("b", 300)],
            fee: 100,
            is_valid: true,
        };
        assert!(plan.is_balanced());
        assert_eq!(plan.change_output().unwrap().value, 300);
    }

    #[test]
    fn plan_unbalanced() {
        let plan = TransactionPlan {
            inputs: vec![utxo(1000)],
            outputs: vec![TransactionTarget::payment("a", 600)],
            fee: 100,
            is_valid: true,
        };
        assert!(!plan.is_balanced());
    }

    #[test]
    fn plan_total_overflow_is_none() {
        let plan = TransactionPlan {
            inputs: vec![utxo(u64::MAX), utxo(1)],
            outputs: vec![],
            fee: 0,
            is_valid: true,
        };
        assert_eq!(plan.input_total(), None);
        assert!(!plan.is_balanced());
    }

    #[test]
    fn invalid_plan_is_empty() {
        let plan = TransactionPlan::invalid();
        assert!(!plan.is_valid);
        assert!(plan.inputs.is_empty());
        assert!(plan.outputs.is_empty());
    }

    #[test]
    fn speed_tier_parse_and_serde() {
        assert_eq!("FAST".parse::<SpeedTier>().unwrap(), SpeedTier::Fast);
        assert!("ludicrous".parse::<SpeedTier>().is_err());
        assert_eq!(serde_json::to_string(&SpeedTier::Slow).unwrap(), "\"slow\"");
    }

    #[test]
    fn speed_tiers_are_ordered() {
        assert!(SpeedTier::Slow < SpeedTier::Normal);
        assert!(SpeedTier::Normal < SpeedTier::Fast);
    }

    #[test]
    fn connection_key_pair_field_names() {
        let pair = ConnectionKeyPair { a: "02aa".into(), ad: "03bb".into(), conn_index: 7 };
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["A"], "02aa");
        assert_eq!(json["Ad"], "03bb");
        assert_eq!(json["connIndex"], 7);
    }
}

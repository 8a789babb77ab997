//! Accumulative coin selection with a fixed-size fee model.
//!
//! UTXOs are consumed in the order supplied until their total covers the
//! targets plus the fee for the inputs chosen so far. The fee always reserves
//! room for one change output, so a plan without change still balances.

use std::convert::Infallible;

use pillar_core::constants::{
    FAST_FEE_RATE, NORMAL_FEE_RATE, SLOW_FEE_RATE, TX_INPUT_BYTES, TX_OUTPUT_BYTES,
    TX_OVERHEAD_BYTES,
};
use pillar_core::types::{SpeedTier, TransactionPlan, TransactionTarget, Utxo};
use tracing::debug;

/// Fee rates in satoshis per byte for each speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRates {
    pub slow: u64,
    pub normal: u64,
    pub fast: u64,
}

impl FeeRates {
    pub fn rate(&self, tier: SpeedTier) -> u64 {
        match tier {
            SpeedTier::Slow => self.slow,
            SpeedTier::Normal => self.normal,
            SpeedTier::Fast => self.fast,
        }
    }
}

impl Default for FeeRates {
    fn default() -> Self {
        Self {
            slow: SLOW_FEE_RATE,
            normal: NORMAL_FEE_RATE,
            fast: FAST_FEE_RATE,
        }
    }
}

/// Legacy P2PKH transaction size estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeModel {
    pub overhead_bytes: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl FeeModel {
    pub fn estimate_bytes(&self, inputs: usize, outputs: usize) -> u64 {
        self.overhead_bytes
            .saturating_add(self.input_bytes.saturating_mul(inputs as u64))
            .saturating_add(self.output_bytes.saturating_mul(outputs as u64))
    }

    pub fn fee(&self, inputs: usize, outputs: usize, rate: u64) -> u64 {
        self.estimate_bytes(inputs, outputs).saturating_mul(rate)
    }
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            overhead_bytes: TX_OVERHEAD_BYTES,
            input_bytes: TX_INPUT_BYTES,
            output_bytes: TX_OUTPUT_BYTES,
        }
    }
}

/// Coin selector over an externally supplied UTXO set.
#[derive(Debug, Clone, Default)]
pub struct CoinSelector {
    rates: FeeRates,
    model: FeeModel,
}

impl CoinSelector {
    pub fn new(rates: FeeRates) -> Self {
        Self {
            rates,
            model: FeeModel::default(),
        }
    }

    pub fn fee_rates(&self) -> FeeRates {
        self.rates
    }

    /// Fee for a transaction with `inputs` inputs paying `targets` targets plus change.
    pub fn estimate_fee(&self, inputs: usize, targets: usize, tier: SpeedTier) -> u64 {
        self.model
            .fee(inputs, targets.saturating_add(1), self.rates.rate(tier))
    }

    /// Select inputs for `targets`.
    ///
    /// `change_address` is called at most once, and only when the plan has
    /// a non-zero change output. An unfundable request yields
    /// [`TransactionPlan::invalid`].
    pub fn collect_outputs<F>(
        &self,
        targets: &[TransactionTarget],
        tier: SpeedTier,
        utxos: &[Utxo],
        change_address: F,
    ) -> TransactionPlan
    where
        F: FnOnce() -> String,
    {
        match self.try_collect_outputs(targets, tier, utxos, || {
            Ok::<_, Infallible>(change_address())
        }) {
            Ok(plan) => plan,
            Err(never) => match never {},
        }
    }

    /// Like [`collect_outputs`](Self::collect_outputs) with a fallible change provider.
    pub fn try_collect_outputs<F, E>(
        &self,
        targets: &[TransactionTarget],
        tier: SpeedTier,
        utxos: &[Utxo],
        change_address: F,
    ) -> Result<TransactionPlan, E>
    where
        F: FnOnce() -> Result<String, E>,
    {
        if targets.is_empty() || targets.iter().any(|t| t.value == 0) {
            debug!(targets = targets.len(), "no payable targets");
            return Ok(TransactionPlan::invalid());
        }
        let Some(required) = targets
            .iter()
            .try_fold(0u64, |acc, t| acc.checked_add(t.value))
        else {
            debug!("target sum overflows");
            return Ok(TransactionPlan::invalid());
        };

        let mut inputs = Vec::new();
        let mut input_total = 0u64;
        let mut funded = None;
        for utxo in utxos {
            inputs.push(utxo.clone());
            input_total = match input_total.checked_add(utxo.value) {
                Some(total) => total,
                None => {
                    debug!("input sum overflows");
                    return Ok(TransactionPlan::invalid());
                }
            };
            let fee = self.estimate_fee(inputs.len(), targets.len(), tier);
            if let Some(needed) = required.checked_add(fee) {
                if input_total >= needed {
                    funded = Some(fee);
                    break;
                }
            }
        }

        let Some(fee) = funded else {
            debug!(
                required,
                available = input_total,
                utxos = utxos.len(),
                tier = %tier,
                "insufficient funds"
            );
            return Ok(TransactionPlan::invalid());
        };

        let mut outputs: Vec<TransactionTarget> = targets
            .iter()
            .map(|t| TransactionTarget::payment(t.address.clone(), t.value))
            .collect();
        let change = input_total - required - fee;
        if change > 0 {
            outputs.push(TransactionTarget::change(change_address()?, change));
        }

        debug!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            fee,
            change,
            tier = %tier,
            "coin selection complete"
        );
        Ok(TransactionPlan {
            inputs,
            outputs,
            fee,
            is_valid: true,
        })
    }
}

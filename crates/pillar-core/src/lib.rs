//! # pillar-core
//! Foundation types, constants and error enums shared by the Pillar wallet
//! engine: UTXO records, payment targets, transaction plans, connection key
//! pairs and the speed tiers used for fee estimation.

pub mod constants;
pub mod error;
pub mod types;

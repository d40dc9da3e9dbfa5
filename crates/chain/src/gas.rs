//! Per-chain gas policy table.
//!
//! A chain may carry an optional `GasPolicy` that overrides the signer's
//! raw fee estimate: gas is multiplied by a buffer factor (rounded up) and
//! the fee amount is recomputed at that chain's configured gas price.
//! Chains without a policy use the raw estimate unmodified.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::msg::Coin;

/// A computed transaction fee: gas limit plus the coin paying for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub gas_limit: u64,
    pub amount: Coin,
}

impl Fee {
    pub fn new(gas_limit: u64, amount: Coin) -> Self {
        Self { gas_limit, amount }
    }
}

/// Gas override for one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasPolicy {
    /// Gas buffer multiplier applied to the raw estimate (e.g. 1.5).
    pub gas_buffer: f64,
    /// Denom the fee is paid in on this chain.
    pub fee_denom: String,
    /// Price per gas unit, in `fee_denom` micro-units.
    pub gas_price: f64,
}

impl GasPolicy {
    /// Apply the buffer to a raw gas estimate and recompute the fee amount
    /// at this chain's gas price. Both roundings are upward so the buffered
    /// fee never undershoots.
    pub fn buffered_fee(&self, gas_estimate: u64) -> Fee {
        let gas_limit = (gas_estimate as f64 * self.gas_buffer).ceil() as u64;
        let amount = (gas_limit as f64 * self.gas_price).ceil() as u128;
        Fee::new(gas_limit, Coin::new(self.fee_denom.clone(), amount))
    }
}

/// Optional gas policies keyed by chain identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GasPolicyTable {
    #[serde(default)]
    policies: HashMap<String, GasPolicy>,
}

impl GasPolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table from a TOML file of the form:
    ///
    /// ```toml
    /// [policies.osmosis-1]
    /// gas_buffer = 1.5
    /// fee_denom = "uosmo"
    /// gas_price = 0.025
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let table: GasPolicyTable = toml::from_str(&content)?;
        Ok(table)
    }

    pub fn insert(&mut self, chain_id: impl Into<String>, policy: GasPolicy) {
        self.policies.insert(chain_id.into(), policy);
    }

    pub fn get(&self, chain_id: &str) -> Option<&GasPolicy> {
        self.policies.get(chain_id)
    }

    /// Buffer a raw fee estimate for `chain_id`, or pass it through
    /// unmodified when no policy is configured.
    pub fn apply(&self, chain_id: &str, raw: Fee) -> Fee {
        match self.get(chain_id) {
            Some(policy) => policy.buffered_fee(raw.gas_limit),
            None => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> GasPolicy {
        GasPolicy {
            gas_buffer: 1.5,
            fee_denom: "uosmo".into(),
            gas_price: 0.025,
        }
    }

    #[test]
    fn test_buffered_fee_rounds_up() {
        // 200_000 * 1.5 = 300_000 gas, 300_000 * 0.025 = 7_500
        let fee = policy().buffered_fee(200_000);
        assert_eq!(fee.gas_limit, 300_000);
        assert_eq!(fee.amount, Coin::new("uosmo", 7_500));

        // 100_001 * 1.5 = 150_001.5 -> ceil 150_002
        let fee = policy().buffered_fee(100_001);
        assert_eq!(fee.gas_limit, 150_002);
        assert_eq!(fee.amount.amount, "3751"); // ceil(3750.05)
    }

    #[test]
    fn test_table_passthrough_without_policy() {
        let mut table = GasPolicyTable::new();
        table.insert("osmosis-1", policy());

        let raw = Fee::new(180_000, Coin::new("ucdt", 450));
        let buffered = table.apply("osmosis-1", raw.clone());
        assert_eq!(buffered.gas_limit, 270_000);
        assert_eq!(buffered.amount.denom, "uosmo");

        // Unknown chain keeps the raw estimate
        let untouched = table.apply("neutron-1", raw.clone());
        assert_eq!(untouched, raw);
    }

    #[test]
    fn test_table_toml_roundtrip() {
        let toml_src = r#"
            [policies.osmosis-1]
            gas_buffer = 1.5
            fee_denom = "uosmo"
            gas_price = 0.025
        "#;
        let table: GasPolicyTable = toml::from_str(toml_src).unwrap();
        assert_eq!(table.get("osmosis-1"), Some(&policy()));
        assert!(table.get("juno-1").is_none());
    }
}

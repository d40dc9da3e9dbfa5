//! Engine configuration with profile support.
//!
//! Explicit, passed-by-reference configuration: nothing here is global.
//! Profiles bundle sensible defaults (testing, production); a file path
//! in `ENGINE_PROFILE` loads a TOML override instead.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable selecting the profile or a config file path.
pub const PROFILE_ENV: &str = "ENGINE_PROFILE";

/// All engine runtime parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Chain identifier, used to look up the gas policy
    #[serde(default = "default_chain_id")]
    pub chain_id: String,

    /// Basket this engine instance works against
    #[serde(default = "default_basket_id")]
    pub basket_id: u64,

    /// Indexer base URL; `${VAR}` placeholders are expanded
    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,

    /// Caller-specific liquidation fee discount (0-1)
    #[serde(default)]
    pub caller_discount: f64,

    /// Starting slippage tolerance for adaptive submits (percent)
    #[serde(default = "default_base_slippage")]
    pub base_slippage_pct: f64,

    /// Grace window before the claim action disables (seconds)
    #[serde(default = "default_claim_grace")]
    pub claim_grace_secs: i64,

    /// Scan loop interval (milliseconds)
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,

    /// Query cache TTL (milliseconds)
    #[serde(default = "default_query_ttl")]
    pub query_ttl_ms: u64,

    /// Max liquidations submitted per scan tick
    #[serde(default = "default_max_liquidations")]
    pub max_liquidations_per_tick: usize,

    /// Protocol contract addresses
    #[serde(default)]
    pub contracts: ContractsConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}
fn default_chain_id() -> String {
    "osmosis-1".to_string()
}
fn default_basket_id() -> u64 {
    1
}
fn default_indexer_url() -> String {
    "${INDEXER_URL}".to_string()
}
fn default_base_slippage() -> f64 {
    1.0
}
fn default_claim_grace() -> i64 {
    10
}
fn default_scan_interval() -> u64 {
    5_000
}
fn default_query_ttl() -> u64 {
    5_000
}
fn default_max_liquidations() -> usize {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            chain_id: default_chain_id(),
            basket_id: default_basket_id(),
            indexer_url: default_indexer_url(),
            caller_discount: 0.0,
            base_slippage_pct: default_base_slippage(),
            claim_grace_secs: default_claim_grace(),
            scan_interval_ms: default_scan_interval(),
            query_ttl_ms: default_query_ttl(),
            max_liquidations_per_tick: default_max_liquidations(),
            contracts: ContractsConfig::default(),
        }
    }
}

/// Protocol contract addresses; `${VAR}` placeholders are expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    #[serde(default = "default_contract")]
    pub positions: String,
    #[serde(default = "default_contract")]
    pub liq_queue: String,
    #[serde(default = "default_contract")]
    pub stability_pool: String,
    #[serde(default = "default_contract")]
    pub staking: String,
    #[serde(default = "default_contract")]
    pub vesting: String,
}

fn default_contract() -> String {
    String::new()
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            positions: default_contract(),
            liq_queue: default_contract(),
            stability_pool: default_contract(),
            staking: default_contract(),
            vesting: default_contract(),
        }
    }
}

impl EngineConfig {
    /// Testing profile: fast scans, short grace, no discount.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            scan_interval_ms: 500,
            claim_grace_secs: 2,
            query_ttl_ms: 500,
            ..Self::default()
        }
    }

    /// Production profile: the defaults.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            ..Self::default()
        }
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: EngineConfig = toml::from_str(&content)?;
        config.expand_env_vars();
        Ok(config)
    }

    /// Select a profile via `ENGINE_PROFILE`: `testing`, `production`, or
    /// a config file path. Unset or unknown falls back to defaults.
    pub fn from_env() -> Self {
        let mut config = match std::env::var(PROFILE_ENV).as_deref() {
            Ok("testing") => Self::testing(),
            Ok("production") => Self::production(),
            Ok(path) => Self::from_file(path).unwrap_or_else(|e| {
                info!(error = %e, path, "failed to load config file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.expand_env_vars();
        config
    }

    /// Expand `${VAR}` patterns in URL and address fields.
    pub fn expand_env_vars(&mut self) {
        self.indexer_url = expand_env(&self.indexer_url);
        self.contracts.positions = expand_env(&self.contracts.positions);
        self.contracts.liq_queue = expand_env(&self.contracts.liq_queue);
        self.contracts.stability_pool = expand_env(&self.contracts.stability_pool);
        self.contracts.staking = expand_env(&self.contracts.staking);
        self.contracts.vesting = expand_env(&self.contracts.vesting);
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn query_ttl(&self) -> Duration {
        Duration::from_millis(self.query_ttl_ms)
    }

    /// Log the effective configuration at startup.
    pub fn log_config(&self) {
        info!(
            profile = %self.profile,
            chain_id = %self.chain_id,
            basket_id = self.basket_id,
            caller_discount = self.caller_discount,
            base_slippage_pct = self.base_slippage_pct,
            claim_grace_secs = self.claim_grace_secs,
            scan_interval_ms = self.scan_interval_ms,
            "engine configuration loaded"
        );
    }
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
fn expand_env(s: &str) -> String {
    let mut result = s.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.basket_id, 1);
        assert_eq!(config.claim_grace_secs, 10);
        assert_eq!(config.scan_interval(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_profiles() {
        let testing = EngineConfig::testing();
        assert_eq!(testing.profile, "testing");
        assert_eq!(testing.claim_grace_secs, 2);

        let production = EngineConfig::production();
        assert_eq!(production.scan_interval_ms, 5_000);
    }

    #[test]
    fn test_toml_overrides() {
        let toml_src = r#"
            profile = "custom"
            basket_id = 3
            caller_discount = 0.15

            [contracts]
            positions = "osmo1positions"
        "#;
        let config: EngineConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.profile, "custom");
        assert_eq!(config.basket_id, 3);
        assert!((config.caller_discount - 0.15).abs() < 1e-12);
        assert_eq!(config.contracts.positions, "osmo1positions");
        // Unspecified fields keep their defaults
        assert_eq!(config.scan_interval_ms, 5_000);
    }

    #[test]
    fn test_expand_env() {
        // Use unique var name to avoid conflicts with parallel tests
        std::env::set_var("ENGINE_TEST_VAR", "test_value");
        assert_eq!(expand_env("${ENGINE_TEST_VAR}"), "test_value");
        assert_eq!(
            expand_env("https://${ENGINE_TEST_VAR}/v1"),
            "https://test_value/v1"
        );
        assert_eq!(expand_env("no_vars"), "no_vars");
        std::env::remove_var("ENGINE_TEST_VAR");
    }
}

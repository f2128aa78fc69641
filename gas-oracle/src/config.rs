//! Configuration for the gas price oracle
//!
//! `OracleConfig` derives `clap::Args` so a host binary can flatten it into
//! its own CLI; every option also reads from a `GAS_ORACLE_` env var.

use std::time::Duration;

use clap::Args;

use crate::{backoff::BackoffConfig, error::OracleError, price_source::PriceSource};

// -------------
// | Constants |
// -------------

/// The default window after which a cached price is considered stale
pub const DEFAULT_STALENESS_WINDOW_MS: u64 = 30_000; // 30 seconds
/// The default gas price on rollups, 0.1 gwei (the Arbitrum Orbit floor)
pub const DEFAULT_ROLLUP_GAS_PRICE_WEI: u64 = 100_000_000;
/// The default gas price on other EVM chains, 10 gwei
pub const DEFAULT_EVM_GAS_PRICE_WEI: u64 = 10_000_000_000;
/// The default percentage added on top of every fetched price
pub const DEFAULT_PRICE_BUFFER_PERCENT: u64 = 10;
/// The default initial resubscribe backoff
pub const DEFAULT_BACKOFF_INITIAL_INTERVAL_MS: u64 = 1_000; // 1 second
/// The default ceiling on a single resubscribe backoff
pub const DEFAULT_BACKOFF_MAX_INTERVAL_MS: u64 = 60_000; // 1 minute
/// The default growth factor of the resubscribe backoff
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;
/// The default jitter applied to each resubscribe backoff
pub const DEFAULT_BACKOFF_RANDOMIZATION_FACTOR: f64 = 0.5;
/// The default time spent recovering before an operational alert is raised
pub const DEFAULT_RECOVERY_ALERT_AFTER_MS: u64 = 15 * 60 * 1_000; // 15 minutes

// ----------
// | Config |
// ----------

/// Gas price oracle configuration
#[derive(Args, Debug, Clone)]
pub struct OracleConfig {
    /// The websocket URL of the chain node
    #[arg(long = "gas-oracle-rpc-ws-url", env = "GAS_ORACLE_RPC_WS_URL")]
    pub rpc_websocket_url: String,
    /// The age in milliseconds after which a cached price is considered stale
    #[arg(
        long = "gas-oracle-staleness-window-ms",
        env = "GAS_ORACLE_STALENESS_WINDOW_MS",
        default_value_t = DEFAULT_STALENESS_WINDOW_MS
    )]
    pub staleness_window_ms: u64,
    /// The price returned when the cache is stale or zero
    ///
    /// If unset, a default is chosen based on the detected price source
    #[arg(long = "gas-oracle-default-gas-price-wei", env = "GAS_ORACLE_DEFAULT_GAS_PRICE_WEI")]
    pub default_gas_price_wei: Option<u64>,
    /// The percentage added on top of every fetched price before caching
    #[arg(
        long = "gas-oracle-price-buffer-percent",
        env = "GAS_ORACLE_PRICE_BUFFER_PERCENT",
        default_value_t = DEFAULT_PRICE_BUFFER_PERCENT
    )]
    pub price_buffer_percent: u64,
    /// The first resubscribe backoff in milliseconds
    #[arg(
        long = "gas-oracle-backoff-initial-interval-ms",
        env = "GAS_ORACLE_BACKOFF_INITIAL_INTERVAL_MS",
        default_value_t = DEFAULT_BACKOFF_INITIAL_INTERVAL_MS
    )]
    pub backoff_initial_interval_ms: u64,
    /// The largest resubscribe backoff in milliseconds
    #[arg(
        long = "gas-oracle-backoff-max-interval-ms",
        env = "GAS_ORACLE_BACKOFF_MAX_INTERVAL_MS",
        default_value_t = DEFAULT_BACKOFF_MAX_INTERVAL_MS
    )]
    pub backoff_max_interval_ms: u64,
    /// The factor by which the resubscribe backoff grows per attempt
    #[arg(
        long = "gas-oracle-backoff-multiplier",
        env = "GAS_ORACLE_BACKOFF_MULTIPLIER",
        default_value_t = DEFAULT_BACKOFF_MULTIPLIER
    )]
    pub backoff_multiplier: f64,
    /// The jitter applied to each backoff, as a fraction of the interval
    #[arg(
        long = "gas-oracle-backoff-randomization-factor",
        env = "GAS_ORACLE_BACKOFF_RANDOMIZATION_FACTOR",
        default_value_t = DEFAULT_BACKOFF_RANDOMIZATION_FACTOR
    )]
    pub backoff_randomization_factor: f64,
    /// How long, in milliseconds, recovery may fail before an alert is raised
    #[arg(
        long = "gas-oracle-recovery-alert-after-ms",
        env = "GAS_ORACLE_RECOVERY_ALERT_AFTER_MS",
        default_value_t = DEFAULT_RECOVERY_ALERT_AFTER_MS
    )]
    pub recovery_alert_after_ms: u64,
    /// How long, in milliseconds, recovery may fail before the loop gives up
    ///
    /// Unset means retry forever
    #[arg(long = "gas-oracle-max-recovery-ms", env = "GAS_ORACLE_MAX_RECOVERY_MS")]
    pub max_recovery_ms: Option<u64>,
}

impl OracleConfig {
    /// Create a config for the given endpoint with every other option at its
    /// default
    pub fn new(rpc_websocket_url: impl Into<String>) -> Self {
        Self {
            rpc_websocket_url: rpc_websocket_url.into(),
            staleness_window_ms: DEFAULT_STALENESS_WINDOW_MS,
            default_gas_price_wei: None,
            price_buffer_percent: DEFAULT_PRICE_BUFFER_PERCENT,
            backoff_initial_interval_ms: DEFAULT_BACKOFF_INITIAL_INTERVAL_MS,
            backoff_max_interval_ms: DEFAULT_BACKOFF_MAX_INTERVAL_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            backoff_randomization_factor: DEFAULT_BACKOFF_RANDOMIZATION_FACTOR,
            recovery_alert_after_ms: DEFAULT_RECOVERY_ALERT_AFTER_MS,
            max_recovery_ms: None,
        }
    }

    /// The staleness window as a duration
    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_window_ms)
    }

    /// The default price for the given source, honoring any override
    pub fn default_gas_price(&self, source: PriceSource) -> u64 {
        self.default_gas_price_wei.unwrap_or(match source {
            PriceSource::RollupMinimum => DEFAULT_ROLLUP_GAS_PRICE_WEI,
            PriceSource::NodeEstimate => DEFAULT_EVM_GAS_PRICE_WEI,
        })
    }

    /// The resubscribe backoff policy
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_interval: Duration::from_millis(self.backoff_initial_interval_ms),
            max_interval: Duration::from_millis(self.backoff_max_interval_ms),
            multiplier: self.backoff_multiplier,
            randomization_factor: self.backoff_randomization_factor,
        }
    }

    /// How long recovery may fail before an alert is raised
    pub fn recovery_alert_after(&self) -> Duration {
        Duration::from_millis(self.recovery_alert_after_ms)
    }

    /// How long recovery may fail before the loop gives up, if bounded
    pub fn max_recovery_duration(&self) -> Option<Duration> {
        self.max_recovery_ms.map(Duration::from_millis)
    }

    /// Check that the backoff parameters describe a usable policy
    pub fn validate(&self) -> Result<(), OracleError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(OracleError::config(format!(
                "backoff multiplier must be finite and at least 1, got {}",
                self.backoff_multiplier
            )));
        }

        let factor = self.backoff_randomization_factor;
        if !factor.is_finite() || !(0.0..=1.0).contains(&factor) {
            return Err(OracleError::config(format!(
                "backoff randomization factor must be within [0, 1], got {factor}"
            )));
        }

        if self.backoff_initial_interval_ms > self.backoff_max_interval_ms {
            return Err(OracleError::config(format!(
                "backoff initial interval {}ms exceeds the maximum {}ms",
                self.backoff_initial_interval_ms, self.backoff_max_interval_ms
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    /// A host CLI flattening the oracle config
    #[derive(Parser, Debug)]
    struct HostCli {
        /// The oracle config
        #[command(flatten)]
        oracle: OracleConfig,
    }

    #[test]
    fn test_cli_defaults_match_programmatic_defaults() {
        let cli = HostCli::parse_from(["host", "--gas-oracle-rpc-ws-url", "ws://localhost:8545"]);
        let expected = OracleConfig::new("ws://localhost:8545");

        assert_eq!(cli.oracle.rpc_websocket_url, expected.rpc_websocket_url);
        assert_eq!(cli.oracle.staleness_window_ms, expected.staleness_window_ms);
        assert_eq!(cli.oracle.price_buffer_percent, expected.price_buffer_percent);
        assert_eq!(cli.oracle.backoff_initial_interval_ms, expected.backoff_initial_interval_ms);
        assert_eq!(cli.oracle.max_recovery_ms, None);
    }

    #[test]
    fn test_default_config_is_valid() {
        OracleConfig::new("ws://localhost:8545").validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_unusable_backoff() {
        let base = OracleConfig::new("ws://localhost:8545");
        let invalid = [
            OracleConfig { backoff_multiplier: f64::NAN, ..base.clone() },
            OracleConfig { backoff_multiplier: f64::INFINITY, ..base.clone() },
            OracleConfig { backoff_multiplier: 0.5, ..base.clone() },
            OracleConfig { backoff_randomization_factor: f64::NAN, ..base.clone() },
            OracleConfig { backoff_randomization_factor: f64::INFINITY, ..base.clone() },
            OracleConfig { backoff_randomization_factor: -0.1, ..base.clone() },
            OracleConfig { backoff_initial_interval_ms: 120_000, ..base.clone() },
        ];

        for config in invalid {
            assert!(matches!(config.validate(), Err(OracleError::Config(_))), "{config:?}");
        }
    }

    #[test]
    fn test_cli_accepts_nan_but_validation_rejects_it() {
        let cli = HostCli::parse_from([
            "host",
            "--gas-oracle-rpc-ws-url",
            "ws://localhost:8545",
            "--gas-oracle-backoff-randomization-factor",
            "NaN",
        ]);

        assert!(cli.oracle.backoff_randomization_factor.is_nan());
        assert!(cli.oracle.validate().is_err());
    }

    #[test]
    fn test_default_price_per_source() {
        let mut config = OracleConfig::new("ws://localhost:8545");
        assert_eq!(config.default_gas_price(PriceSource::RollupMinimum), 100_000_000);
        assert_eq!(config.default_gas_price(PriceSource::NodeEstimate), 10_000_000_000);

        config.default_gas_price_wei = Some(42);
        assert_eq!(config.default_gas_price(PriceSource::RollupMinimum), 42);
        assert_eq!(config.default_gas_price(PriceSource::NodeEstimate), 42);
    }
}

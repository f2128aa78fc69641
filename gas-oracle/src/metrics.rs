//! Metric recording helpers
//!
//! Every metric carries the chain id so that several oracles in one process
//! remain distinguishable.

// -------------
// | Constants |
// -------------

/// The metric tracking the latest fetched gas price, in wei
const GAS_PRICE_METRIC_NAME: &str = "gas_oracle_gas_price";
/// The metric counting successful gas price updates
const GAS_PRICE_UPDATES_METRIC_NAME: &str = "gas_oracle_gas_price_updates_total";
/// The metric tracking the unix timestamp of the last successful update
const GAS_PRICE_LAST_UPDATE_METRIC_NAME: &str = "gas_oracle_gas_price_last_update_timestamp";
/// The metric counting reads that fell back to the default price
const DEFAULT_FALLBACK_METRIC_NAME: &str = "gas_oracle_gas_price_default_fallback_total";
/// The metric counting failed gas price fetches
const FETCH_ERRORS_METRIC_NAME: &str = "gas_oracle_gas_price_fetch_errors_total";
/// The metric counting resubscribe attempts
const RESUBSCRIBE_ATTEMPTS_METRIC_NAME: &str = "gas_oracle_resubscribe_attempts_total";
/// The metric counting sustained recovery failures
const RECOVERY_ALERTS_METRIC_NAME: &str = "gas_oracle_recovery_alerts_total";

/// The tag for the chain id
const CHAIN_ID_TAG: &str = "chain_id";
/// The tag for the reason a read fell back to the default
const REASON_TAG: &str = "reason";

// -----------
// | Helpers |
// -----------

/// Build the tags shared by all oracle metrics
fn chain_tags(chain_id: u64) -> Vec<(String, String)> {
    vec![(CHAIN_ID_TAG.to_string(), chain_id.to_string())]
}

/// Record a successful gas price update
pub fn record_gas_price_update(chain_id: u64, gas_price: u64, updated_at_secs: u64) {
    let tags = chain_tags(chain_id);

    metrics::gauge!(GAS_PRICE_METRIC_NAME, &tags).set(gas_price as f64);
    metrics::counter!(GAS_PRICE_UPDATES_METRIC_NAME, &tags).increment(1);
    metrics::gauge!(GAS_PRICE_LAST_UPDATE_METRIC_NAME, &tags).set(updated_at_secs as f64);
}

/// Record a read that returned the default price
pub fn record_default_fallback(chain_id: u64, reason: &str) {
    let mut tags = chain_tags(chain_id);
    tags.push((REASON_TAG.to_string(), reason.to_string()));

    metrics::counter!(DEFAULT_FALLBACK_METRIC_NAME, &tags).increment(1);
}

/// Record a failed gas price fetch
pub fn record_fetch_error(chain_id: u64) {
    metrics::counter!(FETCH_ERRORS_METRIC_NAME, &chain_tags(chain_id)).increment(1);
}

/// Record an attempt to reopen the head subscription
pub fn record_resubscribe_attempt(chain_id: u64) {
    metrics::counter!(RESUBSCRIBE_ATTEMPTS_METRIC_NAME, &chain_tags(chain_id)).increment(1);
}

/// Record that recovery has been failing past the alert threshold
pub fn record_recovery_alert(chain_id: u64) {
    metrics::counter!(RECOVERY_ALERTS_METRIC_NAME, &chain_tags(chain_id)).increment(1);
}

//! Defines a cache for the gas price
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::metrics::{record_default_fallback, record_gas_price_update};

/// The sentinel timestamp for a cache that has never been updated
const NEVER_UPDATED: u64 = 0;

/// Why a read returned the default price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No update landed within the staleness window
    Stale,
    /// The stored price is zero
    Zero,
}

impl FallbackReason {
    /// The metric tag value for the reason
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Zero => "zero",
        }
    }
}

/// The inner cache backing storage. Kept private to hide concurrency details.
struct GasPriceCacheInner {
    /// The latest buffered gas price, in wei
    gas_price: AtomicU64,
    /// The unix time in milliseconds of the latest update
    observed_at_ms: AtomicU64,
    /// The price returned when the cached value cannot be trusted
    default_gas_price: u64,
    /// The maximum age of a trusted value, in milliseconds
    staleness_window_ms: u64,
    /// The chain id, used to label metrics
    chain_id: u64,
}

/// A value-type handle to the gas price cache. Clones are cheap and share
/// state.
///
/// Reads and writes are each a pair of atomic operations, so neither side
/// ever blocks the other. A reader may pair a price with a timestamp from an
/// adjacent update; both only move forward, so the staleness check stays
/// conservative.
#[derive(Clone)]
pub struct GasPriceCache(Arc<GasPriceCacheInner>);

impl GasPriceCache {
    /// Create a new, empty cache
    pub fn new(chain_id: u64, default_gas_price: u64, staleness_window: Duration) -> Self {
        Self(Arc::new(GasPriceCacheInner {
            gas_price: AtomicU64::new(0),
            observed_at_ms: AtomicU64::new(NEVER_UPDATED),
            default_gas_price,
            staleness_window_ms: staleness_window.as_millis() as u64,
            chain_id,
        }))
    }

    /// The price returned when the cached value cannot be trusted
    pub fn default_gas_price(&self) -> u64 {
        self.0.default_gas_price
    }

    /// Overwrite the cached price and the time it was observed
    pub fn update(&self, gas_price: u64, now_ms: u64) {
        self.0.gas_price.store(gas_price, Ordering::Release);
        self.0.observed_at_ms.store(now_ms, Ordering::Release);
    }

    /// Overwrite the cached price and record the update metrics
    ///
    /// `raw_gas_price` is the price as fetched, before any buffer was
    /// applied; it is what the gauge reports.
    pub fn record_update(&self, raw_gas_price: u64, gas_price: u64, now_ms: u64) {
        self.update(gas_price, now_ms);
        record_gas_price_update(self.0.chain_id, raw_gas_price, now_ms / 1_000);
    }

    /// Read the cached price, falling back to the default if it is stale or
    /// zero
    pub fn read(&self, now_ms: u64) -> u64 {
        match self.try_read(now_ms) {
            Ok(price) => price,
            Err(reason) => {
                debug!(
                    chain_id = self.0.chain_id,
                    reason = reason.as_str(),
                    default_gas_price = self.0.default_gas_price,
                    "returning default gas price"
                );
                record_default_fallback(self.0.chain_id, reason.as_str());
                self.0.default_gas_price
            },
        }
    }

    /// Read the cached price without falling back
    pub fn try_read(&self, now_ms: u64) -> Result<u64, FallbackReason> {
        let observed_at = self.0.observed_at_ms.load(Ordering::Acquire);
        let gas_price = self.0.gas_price.load(Ordering::Acquire);

        if observed_at == NEVER_UPDATED
            || now_ms.saturating_sub(observed_at) > self.0.staleness_window_ms
        {
            return Err(FallbackReason::Stale);
        }

        if gas_price == 0 {
            return Err(FallbackReason::Zero);
        }

        Ok(gas_price)
    }

    /// The unix time in milliseconds of the latest update, if any
    pub fn observed_at_ms(&self) -> Option<u64> {
        match self.0.observed_at_ms.load(Ordering::Acquire) {
            NEVER_UPDATED => None,
            v => Some(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

    use super::*;

    /// The chain id used in tests
    const CHAIN_ID: u64 = 1;
    /// The default price used in tests
    const DEFAULT_PRICE: u64 = 10_000_000_000;
    /// The staleness window used in tests
    const WINDOW: Duration = Duration::from_secs(30);
    /// A fixed "now" for deterministic reads
    const NOW_MS: u64 = 1_700_000_000_000;

    /// Build a cache with the test parameters
    fn cache() -> GasPriceCache {
        GasPriceCache::new(CHAIN_ID, DEFAULT_PRICE, WINDOW)
    }

    /// Find the recorded value of a metric carrying the given labels
    fn metric_value(snapshotter: &Snapshotter, name: &str, labels: &[(&str, &str)]) -> Option<DebugValue> {
        snapshotter.snapshot().into_vec().into_iter().find_map(|(key, _, _, value)| {
            let key = key.key();
            let matches = key.name() == name
                && labels.iter().all(|(k, v)| key.labels().any(|l| l.key() == *k && l.value() == *v));
            matches.then_some(value)
        })
    }

    #[test]
    fn test_read_before_any_update_returns_default() {
        let cache = cache();
        assert_eq!(cache.read(NOW_MS), DEFAULT_PRICE);
        assert_eq!(cache.try_read(NOW_MS), Err(FallbackReason::Stale));
        assert_eq!(cache.observed_at_ms(), None);
    }

    #[test]
    fn test_fresh_value_is_returned() {
        let cache = cache();
        cache.update(1_234, NOW_MS);

        assert_eq!(cache.read(NOW_MS), 1_234);
        assert_eq!(cache.read(NOW_MS + 29_999), 1_234);
        assert_eq!(cache.observed_at_ms(), Some(NOW_MS));
    }

    #[test]
    fn test_staleness_boundary() {
        let cache = cache();
        cache.update(1_234, NOW_MS);

        assert_eq!(cache.read(NOW_MS + 30_000), 1_234);
        assert_eq!(cache.read(NOW_MS + 30_001), DEFAULT_PRICE);
        assert_eq!(cache.try_read(NOW_MS + 30_001), Err(FallbackReason::Stale));
    }

    #[test]
    fn test_zero_returns_default_even_when_fresh() {
        let cache = cache();
        cache.update(0, NOW_MS);

        assert_eq!(cache.read(NOW_MS), DEFAULT_PRICE);
        assert_eq!(cache.try_read(NOW_MS), Err(FallbackReason::Zero));
    }

    #[test]
    fn test_clock_skew_counts_as_fresh() {
        let cache = cache();
        cache.update(1_234, NOW_MS);

        assert_eq!(cache.read(NOW_MS - 5_000), 1_234);
    }

    #[test]
    fn test_later_update_wins() {
        let cache = cache();
        cache.update(1_000, NOW_MS);
        cache.record_update(1_800, 2_000, NOW_MS + 1_000);

        assert_eq!(cache.read(NOW_MS + 1_000), 2_000);
    }

    #[test]
    fn test_fallbacks_are_counted_by_reason() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let cache = cache();

        metrics::with_local_recorder(&recorder, || {
            cache.read(NOW_MS);
            cache.update(0, NOW_MS);
            cache.read(NOW_MS);
            cache.read(NOW_MS);
        });

        let stale = [("chain_id", "1"), ("reason", "stale")];
        let zero = [("chain_id", "1"), ("reason", "zero")];
        let name = "gas_oracle_gas_price_default_fallback_total";
        assert_eq!(metric_value(&snapshotter, name, &stale), Some(DebugValue::Counter(1)));
        assert_eq!(metric_value(&snapshotter, name, &zero), Some(DebugValue::Counter(2)));
    }

    #[test]
    fn test_fresh_read_records_no_fallback() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let cache = cache();
        cache.update(1_234, NOW_MS);

        metrics::with_local_recorder(&recorder, || cache.read(NOW_MS));

        let name = "gas_oracle_gas_price_default_fallback_total";
        assert_eq!(metric_value(&snapshotter, name, &[]), None);
    }

    #[test]
    fn test_record_update_emits_update_metrics() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let cache = cache();

        metrics::with_local_recorder(&recorder, || {
            cache.record_update(1_800, 2_000, NOW_MS);
            cache.record_update(1_900, 2_100, NOW_MS + 1_000);
        });

        let labels = [("chain_id", "1")];
        assert_eq!(
            metric_value(&snapshotter, "gas_oracle_gas_price_updates_total", &labels),
            Some(DebugValue::Counter(2))
        );

        // The gauge reports the raw price, the cache serves the buffered one
        let Some(DebugValue::Gauge(price)) =
            metric_value(&snapshotter, "gas_oracle_gas_price", &labels)
        else {
            panic!("gas price gauge not recorded");
        };
        assert_eq!(price.into_inner(), 1_900.0);
        assert_eq!(cache.read(NOW_MS + 1_000), 2_100);

        let Some(DebugValue::Gauge(updated_at)) =
            metric_value(&snapshotter, "gas_oracle_gas_price_last_update_timestamp", &labels)
        else {
            panic!("last update gauge not recorded");
        };
        assert_eq!(updated_at.into_inner(), ((NOW_MS + 1_000) / 1_000) as f64);
    }

    #[test]
    fn test_concurrent_readers_never_observe_zero() {
        let cache = cache();
        cache.update(1, NOW_MS);

        let writer = {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 1..=10_000u64 {
                    cache.update(i, NOW_MS + i);
                }
            })
        };

        let readers: Vec<_> = (0..100)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let price = cache.read(NOW_MS + 10_000);
                        assert!(price > 0);
                        assert_ne!(price, DEFAULT_PRICE);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}

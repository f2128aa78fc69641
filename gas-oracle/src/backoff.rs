//! Exponential backoff for resubscription attempts
//!
//! Each delay is drawn uniformly from `[interval * (1 - r), interval * (1 + r)]`
//! where `r` is the randomization factor; the interval then grows by the
//! multiplier until it reaches the maximum. There is no limit on the number
//! of delays handed out.

use std::time::Duration;

use rand::Rng;

/// The parameters of an exponential backoff policy
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// The interval used for the first delay
    pub initial_interval: Duration,
    /// The largest interval the policy grows to
    pub max_interval: Duration,
    /// The factor the interval grows by after each delay
    pub multiplier: f64,
    /// The jitter applied to each delay, as a fraction of the interval
    pub randomization_factor: f64,
}

/// An exponential backoff in progress
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// The policy parameters
    config: BackoffConfig,
    /// The interval the next delay is drawn around
    current_interval: Duration,
}

impl ExponentialBackoff {
    /// Start a new backoff at the initial interval
    pub fn new(config: BackoffConfig) -> Self {
        Self { current_interval: config.initial_interval, config }
    }

    /// The interval the next delay will be drawn around
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Return the next delay and advance the interval
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.randomize(self.current_interval);

        // `f64::max` ignores a NaN multiplier
        let multiplier = self.config.multiplier.max(1.0);
        let grown = Duration::try_from_secs_f64(self.current_interval.as_secs_f64() * multiplier)
            .unwrap_or(self.config.max_interval);
        self.current_interval = grown.min(self.config.max_interval);

        delay
    }

    /// Apply the randomization factor to an interval
    fn randomize(&self, interval: Duration) -> Duration {
        let factor = self.config.randomization_factor;
        if factor.is_nan() || factor <= 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * factor.min(1.0);
        let jittered = rand::thread_rng().gen_range((secs - delta)..=(secs + delta));
        Duration::try_from_secs_f64(jittered).unwrap_or(self.config.max_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A policy without jitter, for deterministic delays
    fn deterministic_config() -> BackoffConfig {
        BackoffConfig {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(1_000),
            multiplier: 2.0,
            randomization_factor: 0.0,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = ExponentialBackoff::new(deterministic_config());

        let delays: Vec<u128> = (0..7).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000, 1_000]);
    }

    #[test]
    fn test_current_interval_tracks_growth() {
        let mut backoff = ExponentialBackoff::new(deterministic_config());
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current_interval(), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_jitter_stays_in_bounds() {
        let config = BackoffConfig {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            multiplier: 1.5,
            randomization_factor: 0.5,
        };

        for _ in 0..100 {
            let mut backoff = ExponentialBackoff::new(config);
            let first = backoff.next_delay();
            assert!(first >= Duration::from_millis(500) && first <= Duration::from_millis(1_500));

            let second = backoff.next_delay();
            assert!(second >= Duration::from_millis(750) && second <= Duration::from_millis(2_250));
        }
    }

    #[test]
    fn test_nan_randomization_factor_disables_jitter() {
        let config = BackoffConfig { randomization_factor: f64::NAN, ..deterministic_config() };
        let mut backoff = ExponentialBackoff::new(config);

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_unbounded_multiplier_saturates_at_max_interval() {
        for multiplier in [f64::INFINITY, f64::MAX] {
            let config = BackoffConfig { multiplier, ..deterministic_config() };
            let mut backoff = ExponentialBackoff::new(config);

            assert_eq!(backoff.next_delay(), Duration::from_millis(100));
            assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
            assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
        }
    }

    #[test]
    fn test_nan_multiplier_holds_interval() {
        let config = BackoffConfig { multiplier: f64::NAN, ..deterministic_config() };
        let mut backoff = ExponentialBackoff::new(config);

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_never_shrinks_with_small_multiplier() {
        let config = BackoffConfig { multiplier: 0.5, ..deterministic_config() };
        let mut backoff = ExponentialBackoff::new(config);

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }
}

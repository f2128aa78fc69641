//! Defines a worker that listens for blocks and updates the gas price cache
//!
//! The worker moves between three states:
//! - Watching: waits on the shutdown signal and the head subscription,
//!   refreshing the cache on every header
//! - Recovering: after a subscription error, drops the dead subscription
//!   and reopens it under exponential backoff until it succeeds or shutdown
//!   is requested
//! - Stopped: on shutdown, or fatally when the notification channel closes
//!
//! Shutdown is observed at every suspension point, including while a fetch
//! or a resubscribe attempt is in flight.

use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    backoff::{BackoffConfig, ExponentialBackoff},
    client::{BlockHeader, ChainClient, HeadSubscription, SubscriptionError},
    error::OracleError,
    gas_cache::GasPriceCache,
    helpers::get_current_time_millis,
    metrics::{record_fetch_error, record_recovery_alert, record_resubscribe_attempt},
    price_source::{apply_price_buffer, fetch_gas_price, PriceSource},
};

/// How a watch over a live subscription ended
enum WatchOutcome {
    /// Shutdown was requested
    Shutdown,
    /// The subscription reported an error and should be rebuilt
    Failed(SubscriptionError),
    /// The notification channel closed
    Closed,
}

/// The parameters of the worker's recovery policy
#[derive(Debug, Clone, Copy)]
pub struct RecoveryPolicy {
    /// The resubscribe backoff
    pub backoff: BackoffConfig,
    /// How long recovery may fail before an alert is raised
    pub alert_after: Duration,
    /// How long recovery may fail before the worker gives up, if bounded
    pub max_duration: Option<Duration>,
}

/// The worker that listens for blocks and updates the gas price cache
pub struct GasPriceWorker<C> {
    /// The node client
    client: Arc<C>,
    /// Where gas prices are read from
    source: PriceSource,
    /// The cache to update
    cache: GasPriceCache,
    /// The percentage added on top of each fetched price
    price_buffer_percent: u64,
    /// The recovery policy
    recovery: RecoveryPolicy,
    /// The chain id, for logs and metrics
    chain_id: u64,
    /// The shared shutdown signal
    cancel: CancellationToken,
}

impl<C: ChainClient> GasPriceWorker<C> {
    /// Create a new worker
    pub fn new(
        client: Arc<C>,
        source: PriceSource,
        cache: GasPriceCache,
        price_buffer_percent: u64,
        recovery: RecoveryPolicy,
        chain_id: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self { client, source, cache, price_buffer_percent, recovery, chain_id, cancel }
    }

    /// Run the worker over an already opened subscription until shutdown or
    /// a fatal error
    pub async fn run(self, mut subscription: HeadSubscription) -> Result<(), OracleError> {
        info!(chain_id = self.chain_id, "watching for new heads");

        loop {
            match self.watch(&mut subscription).await {
                WatchOutcome::Shutdown => {
                    info!(chain_id = self.chain_id, "gas price worker shutting down");
                    return Ok(());
                },
                WatchOutcome::Failed(e) => {
                    warn!(chain_id = self.chain_id, error = %e, "head subscription failed, recovering");
                    drop(subscription);

                    match self.recover().await? {
                        Some(resubscribed) => subscription = resubscribed,
                        None => {
                            info!(chain_id = self.chain_id, "gas price worker shut down while recovering");
                            return Ok(());
                        },
                    }
                },
                WatchOutcome::Closed => {
                    error!(chain_id = self.chain_id, "head subscription channel closed unexpectedly");
                    return Err(OracleError::SubscriptionClosed);
                },
            }
        }
    }

    // ------------
    // | Watching |
    // ------------

    /// Process headers from the subscription until it fails, closes, or
    /// shutdown is requested
    async fn watch(&self, subscription: &mut HeadSubscription) -> WatchOutcome {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return WatchOutcome::Shutdown,
                next = subscription.next() => next,
            };

            match next {
                Some(Ok(header)) => {
                    let refreshed = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return WatchOutcome::Shutdown,
                        res = self.refresh(&header) => res,
                    };

                    // Per-fetch errors leave the previous price in place
                    if let Err(e) = refreshed {
                        warn!(
                            chain_id = self.chain_id,
                            block_number = header.number,
                            error = %e,
                            "failed to refresh gas price"
                        );
                        record_fetch_error(self.chain_id);
                    }
                },
                Some(Err(e)) => return WatchOutcome::Failed(e),
                None => return WatchOutcome::Closed,
            }
        }
    }

    /// Fetch the gas price and write it into the cache
    async fn refresh(&self, header: &BlockHeader) -> Result<(), OracleError> {
        let raw_price = fetch_gas_price(self.client.as_ref(), self.source).await?;
        let price = apply_price_buffer(raw_price, self.price_buffer_percent);
        self.cache.record_update(raw_price, price, get_current_time_millis());

        debug!(
            chain_id = self.chain_id,
            block_number = header.number,
            gas_price = raw_price,
            buffered_gas_price = price,
            "refreshed gas price"
        );
        Ok(())
    }

    // --------------
    // | Recovering |
    // --------------

    /// Reopen the head subscription under exponential backoff
    ///
    /// Returns `None` if shutdown was requested before a subscription was
    /// opened.
    async fn recover(&self) -> Result<Option<HeadSubscription>, OracleError> {
        let mut backoff = ExponentialBackoff::new(self.recovery.backoff);
        let started = Instant::now();
        let mut alerted = false;
        let mut attempt: u64 = 0;

        loop {
            let delay = backoff.next_delay();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {},
            }

            attempt += 1;
            record_resubscribe_attempt(self.chain_id);
            let res = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                res = self.client.subscribe_new_heads() => res,
            };

            let e = match res {
                Ok(subscription) => {
                    info!(chain_id = self.chain_id, attempt, "resubscribed to new heads");
                    return Ok(Some(subscription));
                },
                Err(e) => e,
            };

            let elapsed = started.elapsed();
            warn!(
                chain_id = self.chain_id,
                attempt,
                backoff_duration = ?backoff.current_interval(),
                error = %e,
                "failed to resubscribe to new heads, retrying"
            );

            if let Some(max_duration) = self.recovery.max_duration {
                if elapsed >= max_duration {
                    error!(
                        chain_id = self.chain_id,
                        attempt,
                        elapsed = ?elapsed,
                        "giving up on resubscribing to new heads"
                    );
                    return Err(OracleError::RecoveryExhausted { elapsed, last_error: e.to_string() });
                }
            }

            if !alerted && elapsed >= self.recovery.alert_after {
                error!(
                    chain_id = self.chain_id,
                    attempt,
                    elapsed = ?elapsed,
                    "gas price oracle cannot resubscribe to new heads, serving cached or default prices"
                );
                record_recovery_alert(self.chain_id);
                alerted = true;
            }
        }
    }
}

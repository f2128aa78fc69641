//! The gas price oracle and its lifecycle
//!
//! Construction connects to the node, reads the chain id, detects the price
//! source, and performs one mandatory fetch so the cache is warm before any
//! reader sees it. `start` opens the head subscription and spawns the worker
//! that keeps the cache fresh; `stop` cancels it and waits for it to exit.
//! Both are idempotent and safe to call from concurrent tasks.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures_util::FutureExt;
use tokio::{
    sync::{mpsc::UnboundedSender, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ws::WsChainClient, ChainClient},
    config::OracleConfig,
    error::{OracleError, OracleResult},
    gas_cache::{
        worker::{GasPriceWorker, RecoveryPolicy},
        GasPriceCache,
    },
    helpers::get_current_time_millis,
    price_source::{apply_price_buffer, detect_price_source, fetch_gas_price, PriceSource},
};

/// A type alias for the sender end of a worker closure channel
///
/// The worker sends its exit result on this channel: `Ok(())` after a
/// requested stop, an error when it exits on its own or panics.
pub type ClosureSender = UnboundedSender<Result<(), OracleError>>;

/// A handle to a running worker
struct WorkerHandle {
    /// Signals the worker to stop
    cancel: CancellationToken,
    /// The worker task
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Whether the worker task is still running
    fn is_running(&self) -> bool {
        !self.join.is_finished()
    }
}

/// A gas price oracle for a single chain endpoint
pub struct GasOracle<C: ChainClient = WsChainClient> {
    /// The chain id read at construction
    chain_id: u64,
    /// The node client
    client: Arc<C>,
    /// Where gas prices are read from
    source: PriceSource,
    /// The gas price cache shared with the worker
    cache: GasPriceCache,
    /// The oracle configuration
    config: OracleConfig,
    /// The running worker, if any
    worker: Mutex<Option<WorkerHandle>>,
    /// The channel on which the worker reports its exit
    closure_channel: Option<ClosureSender>,
}

impl GasOracle<WsChainClient> {
    /// Connect to the configured websocket endpoint and build an oracle
    pub async fn connect(config: OracleConfig) -> OracleResult<Self> {
        config.validate()?;
        let client = WsChainClient::connect(&config.rpc_websocket_url).await?;
        Self::new(client, config).await
    }
}

impl<C: ChainClient> GasOracle<C> {
    /// Build an oracle over an existing client
    ///
    /// Fails if the configuration is invalid, the chain id cannot be read, or
    /// the first gas price fetch fails. Nothing is retried.
    pub async fn new(client: C, config: OracleConfig) -> OracleResult<Self> {
        config.validate()?;
        let client = Arc::new(client);
        let chain_id = client.chain_id().await.map_err(OracleError::chain_id)?;

        let source = detect_price_source(client.as_ref()).await;
        let default_gas_price = config.default_gas_price(source);
        info!(
            chain_id,
            gas_price_source = %source,
            default_gas_price,
            staleness_window_ms = config.staleness_window_ms,
            "initializing gas price oracle"
        );

        let cache = GasPriceCache::new(chain_id, default_gas_price, config.staleness_window());

        let raw_price = fetch_gas_price(client.as_ref(), source)
            .await
            .map_err(err_str!(OracleError::InitialFetch))?;
        let price = apply_price_buffer(raw_price, config.price_buffer_percent);
        cache.record_update(raw_price, price, get_current_time_millis());
        info!(chain_id, gas_price = raw_price, buffered_gas_price = price, "fetched initial gas price");

        Ok(Self {
            chain_id,
            client,
            source,
            cache,
            config,
            worker: Mutex::new(None),
            closure_channel: None,
        })
    }

    /// Report worker exits on the given channel
    pub fn with_closure_channel(mut self, closure_channel: ClosureSender) -> Self {
        self.closure_channel = Some(closure_channel);
        self
    }

    // -----------
    // | Getters |
    // -----------

    /// The chain id of the connected node
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The detected price source
    pub fn price_source(&self) -> PriceSource {
        self.source
    }

    /// A handle to the underlying cache
    pub fn cache(&self) -> GasPriceCache {
        self.cache.clone()
    }

    /// The current gas price, in wei
    ///
    /// Never blocks on the network. Returns the default price if the cached
    /// value is stale or zero.
    pub fn get_gas_price(&self) -> u64 {
        self.cache.read(get_current_time_millis())
    }

    /// Whether the worker is currently running
    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.as_ref().is_some_and(WorkerHandle::is_running)
    }

    // -------------
    // | Lifecycle |
    // -------------

    /// Start keeping the cache fresh
    ///
    /// Opens the head subscription before returning so that a dead endpoint
    /// surfaces here. A no-op if the worker is already running; a worker that
    /// exited on its own is replaced.
    pub async fn start(&self) -> OracleResult<()> {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(WorkerHandle::is_running) {
            debug!(chain_id = self.chain_id, "gas price worker already running");
            return Ok(());
        }

        let subscription =
            self.client.subscribe_new_heads().await.map_err(OracleError::subscribe)?;

        let cancel = CancellationToken::new();
        let recovery = RecoveryPolicy {
            backoff: self.config.backoff(),
            alert_after: self.config.recovery_alert_after(),
            max_duration: self.config.max_recovery_duration(),
        };
        let task = GasPriceWorker::new(
            self.client.clone(),
            self.source,
            self.cache.clone(),
            self.config.price_buffer_percent,
            recovery,
            self.chain_id,
            cancel.clone(),
        );

        let chain_id = self.chain_id;
        let closure_channel = self.closure_channel.clone();
        let join = tokio::spawn(async move {
            let res = AssertUnwindSafe(task.run(subscription))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(OracleError::worker_panicked(panic.as_ref())));
            if let Err(e) = &res {
                error!(chain_id, error = %e, "gas price worker exited");
            }

            if let Some(closure_channel) = closure_channel {
                // The receiver may have been dropped by a host shutting down
                let _ = closure_channel.send(res);
            }
        });

        *worker = Some(WorkerHandle { cancel, join });
        info!(chain_id, "started gas price worker");
        Ok(())
    }

    /// Stop the worker and wait for it to exit
    ///
    /// A no-op if the worker is not running. The connection stays open, so
    /// the oracle may be started again.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        let Some(WorkerHandle { cancel, join }) = worker.take() else {
            debug!(chain_id = self.chain_id, "gas price worker not running");
            return;
        };

        cancel.cancel();
        if let Err(e) = join.await {
            warn!(chain_id = self.chain_id, error = %e, "gas price worker panicked");
        }

        info!(chain_id = self.chain_id, "stopped gas price worker");
    }

    /// Stop the worker and release the connection
    pub async fn close(self) {
        self.stop().await;
    }
}

impl<C: ChainClient> Drop for GasOracle<C> {
    fn drop(&mut self) {
        if let Some(WorkerHandle { cancel, .. }) = self.worker.get_mut().take() {
            cancel.cancel();
        }
    }
}

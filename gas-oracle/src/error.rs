//! Error types for the gas price oracle

use std::{any::Any, time::Duration};

use thiserror::Error;

use crate::client::ClientError;

/// Type alias for Results using OracleError
pub type OracleResult<T> = Result<T, OracleError>;

/// The generic oracle error
#[derive(Error, Debug, Clone)]
pub enum OracleError {
    /// An error at the node client seam
    #[error("client error: {0}")]
    Client(#[from] ClientError),
    /// The configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The chain id could not be read from the node
    #[error("failed to read chain id: {0}")]
    ChainId(String),
    /// A gas price fetch failed
    #[error("failed to fetch gas price: {0}")]
    GasPrice(String),
    /// The mandatory gas price fetch during construction failed
    #[error("initial gas price fetch failed: {0}")]
    InitialFetch(String),
    /// A head subscription could not be opened
    #[error("failed to subscribe to new heads: {0}")]
    Subscribe(String),
    /// The head notification channel closed, the connection is unusable
    #[error("head subscription channel closed")]
    SubscriptionClosed,
    /// The worker task panicked
    #[error("gas price worker panicked: {0}")]
    WorkerPanicked(String),
    /// Resubscription kept failing past the configured ceiling
    #[error("failed to resubscribe to new heads after {elapsed:?}: {last_error}")]
    RecoveryExhausted {
        /// How long the loop spent recovering
        elapsed: Duration,
        /// The error from the last resubscribe attempt
        last_error: String,
    },
}

impl OracleError {
    /// Create a new configuration error
    #[allow(clippy::needless_pass_by_value)]
    pub fn config<T: ToString>(e: T) -> Self {
        Self::Config(e.to_string())
    }

    /// Create a new chain id error
    #[allow(clippy::needless_pass_by_value)]
    pub fn chain_id<T: ToString>(e: T) -> Self {
        Self::ChainId(e.to_string())
    }

    /// Create a new gas price error
    #[allow(clippy::needless_pass_by_value)]
    pub fn gas_price<T: ToString>(e: T) -> Self {
        Self::GasPrice(e.to_string())
    }

    /// Create a new worker panic error from a panic payload
    pub fn worker_panicked(payload: &(dyn Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::WorkerPanicked(msg)
    }

    /// Create a new subscribe error
    #[allow(clippy::needless_pass_by_value)]
    pub fn subscribe<T: ToString>(e: T) -> Self {
        Self::Subscribe(e.to_string())
    }
}

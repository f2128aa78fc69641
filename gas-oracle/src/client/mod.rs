//! The node client seam consumed by the oracle
//!
//! The oracle only needs four capabilities from a node: reading bytecode,
//! making a read-only call, asking for a gas price suggestion, and
//! subscribing to new block headers. `WsChainClient` implements them over an
//! alloy websocket provider; tests substitute a scripted client.

use std::pin::Pin;

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

pub mod ws;

// ---------
// | Types |
// ---------

/// The subset of a block header the oracle cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// The block number
    pub number: u64,
    /// The block hash
    pub hash: B256,
    /// The block timestamp, in seconds
    pub timestamp: u64,
}

/// An error reported by a live head subscription
///
/// These are recoverable: the oracle drops the subscription and opens a new
/// one. A subscription whose stream ends instead signals that the connection
/// itself is unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscriber fell behind and notifications were dropped
    #[error("subscription lagged, {0} notifications dropped")]
    Lagged(u64),
    /// The transport reported an error for the subscription
    ///
    /// `WsChainClient` never yields this: alloy's pubsub service closes the
    /// channel when the transport dies. Clients over other transports use it
    /// for errors they can recover from by resubscribing.
    #[error("subscription transport error: {0}")]
    Transport(String),
}

/// A stream of new block headers
///
/// Yields `Err` for a subscription-level error and ends when the underlying
/// notification channel closes.
pub type HeadSubscription =
    Pin<Box<dyn Stream<Item = Result<BlockHeader, SubscriptionError>> + Send>>;

/// An error returned by a node client call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The connection to the node could not be established
    #[error("connection error: {0}")]
    Connection(String),
    /// A request to the node failed
    #[error("rpc error: {0}")]
    Rpc(String),
    /// A subscription could not be opened
    #[error("subscription error: {0}")]
    Subscription(String),
}

impl ClientError {
    /// Create a new rpc error
    #[allow(clippy::needless_pass_by_value)]
    pub fn rpc<T: ToString>(e: T) -> Self {
        Self::Rpc(e.to_string())
    }
}

// ---------
// | Trait |
// ---------

/// A connection to a single chain node
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Read the chain id
    async fn chain_id(&self) -> Result<u64, ClientError>;

    /// Read the bytecode deployed at an address
    async fn code_at(&self, address: Address) -> Result<Bytes, ClientError>;

    /// Make a read-only call and return the raw return data
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError>;

    /// Ask the node for its suggested gas price, in wei
    async fn suggest_gas_price(&self) -> Result<u128, ClientError>;

    /// Open a new head subscription
    async fn subscribe_new_heads(&self) -> Result<HeadSubscription, ClientError>;
}

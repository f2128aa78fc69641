//! A gas price oracle for a single EVM chain endpoint.
//!
//! The oracle keeps the current network gas price fresh by subscribing to
//! new block headers and refreshing a cache on every block. Reads never touch
//! the network: `GasOracle::get_gas_price` loads two atomics and applies a
//! staleness policy, falling back to a conservative default when the cache
//! cannot be trusted.
//!
//! Arbitrum-style rollups are detected at construction by probing for the
//! `ArbGasInfo` precompile; on those chains the price is the precompile's
//! minimum gas price, elsewhere it is the node's `eth_gasPrice` suggestion.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::needless_pass_by_ref_mut)]
#![deny(unsafe_code)]
#![deny(clippy::uninlined_format_args)]

/// Build a closure that maps an error into the given string-wrapping
/// constructor
macro_rules! err_str {
    ($x:expr) => {
        |e| $x(e.to_string())
    };
}

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod gas_cache;
pub mod helpers;
pub mod metrics;
pub mod oracle;
pub mod price_source;
pub mod telemetry;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use client::{ws::WsChainClient, BlockHeader, ChainClient, HeadSubscription};
pub use config::OracleConfig;
pub use error::{OracleError, OracleResult};
pub use gas_cache::GasPriceCache;
pub use oracle::{ClosureSender, GasOracle};
pub use price_source::PriceSource;

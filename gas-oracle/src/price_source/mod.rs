//! Chain type detection and gas price retrieval
//!
//! The strategy is chosen once per oracle: chains exposing the Arbitrum
//! `ArbGasInfo` precompile report their minimum gas price through it, all
//! other chains use the node's `eth_gasPrice` suggestion.

use std::fmt::{self, Display};

use tracing::{info, warn};

use crate::{client::ChainClient, error::OracleError};

pub mod arbitrum;

use arbitrum::ARB_GAS_INFO_ADDRESS;

/// Where the oracle reads the gas price from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// The rollup precompile's minimum gas price
    RollupMinimum,
    /// The node's generic gas price suggestion
    NodeEstimate,
}

impl Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RollupMinimum => write!(f, "arb_minimum"),
            Self::NodeEstimate => write!(f, "eth_gas_price"),
        }
    }
}

/// Determine the price source by probing for the rollup precompile
///
/// Any probe error is treated as "not a rollup" so that detection never
/// aborts construction.
pub async fn detect_price_source<C: ChainClient + ?Sized>(client: &C) -> PriceSource {
    let source = match client.code_at(ARB_GAS_INFO_ADDRESS).await {
        Ok(code) if !code.is_empty() => PriceSource::RollupMinimum,
        Ok(_) => PriceSource::NodeEstimate,
        Err(e) => {
            warn!(error = %e, "rollup precompile probe failed, using the node estimate");
            PriceSource::NodeEstimate
        },
    };

    info!(gas_price_source = %source, "detected gas price source");
    source
}

/// Fetch the current gas price, in wei, from the given source
///
/// Performs a single round trip with no retries of its own.
pub async fn fetch_gas_price<C: ChainClient + ?Sized>(
    client: &C,
    source: PriceSource,
) -> Result<u64, OracleError> {
    match source {
        PriceSource::RollupMinimum => {
            let price = arbitrum::get_minimum_gas_price(client).await?;
            u64::try_from(price).map_err(err_str!(OracleError::GasPrice))
        },
        PriceSource::NodeEstimate => {
            let price = client.suggest_gas_price().await.map_err(OracleError::gas_price)?;
            u64::try_from(price).map_err(err_str!(OracleError::GasPrice))
        },
    }
}

/// Add the configured safety buffer to a fetched price
pub fn apply_price_buffer(price: u64, buffer_percent: u64) -> u64 {
    let buffer = (price as u128 * buffer_percent as u128 / 100).min(u64::MAX as u128) as u64;
    price.saturating_add(buffer)
}

//! Defines a cache for the gas price and the worker that keeps it fresh
pub mod cache;
pub mod worker;

pub use cache::GasPriceCache;

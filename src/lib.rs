//! fx-sdk: leveraged positions on f(x) protocol margin pools
//!
//! Reads pool state, solves flash-loan trades for a target leverage across
//! several swap aggregators and returns ready-to-sign transactions.

pub mod aggregator;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod indexer;
pub mod math;
pub mod pool;
pub mod position;
pub mod router;
pub mod sdk;
pub mod solver;
pub mod tokens;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{Result, SdkError};
pub use sdk::FxSdk;

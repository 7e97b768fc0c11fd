//! Error types for the SDK
//!
//! Every failure surfaced by the library is an `SdkError`. Messages that
//! reach end users (validation, capacity, leverage bounds) are kept verbatim
//! so front-ends can match on them.

use crate::aggregator::RouteType;
use alloy_primitives::Address;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    // ── Input ─────────────────────────────────────────
    #[error("{0}")]
    Validation(String),

    #[error("User is not the owner of the position")]
    NotOwner,

    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Chain access ──────────────────────────────────
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Failed to decode {call}: {reason}")]
    Decode { call: &'static str, reason: String },

    #[error("Failed to get pool info")]
    PoolInfo,

    #[error("Price not found for {0}")]
    PriceNotFound(String),

    #[error("Router not found for {from} to {to}")]
    RouterNotFound { from: Address, to: Address },

    #[error("Position index request failed: {0}")]
    PositionIndex(String),

    // ── Routing ───────────────────────────────────────
    #[error("{provider} request failed: {reason}")]
    Provider { provider: RouteType, reason: String },

    #[error("No best quote found")]
    NoRoute,

    #[error("Exceeds the maximum trading range. Please lower the position size.")]
    ExceedsTradingRange,

    // ── Position feasibility ──────────────────────────
    #[error("We have reached the {label} cap. Opening positions is temporarily unavailable. Please try again later.")]
    PositionCap { label: &'static str },

    #[error("Cannot open or add to given leverage")]
    CannotOpenOrAdd,

    #[error("Cannot close or remove given leverage")]
    CannotCloseOrRemove,

    #[error("Your {label} leverage is lower than the minimum leverage required, please increase your leverage level.")]
    IncreaseLeverage { label: &'static str },

    #[error("Your {label} leverage is higher than the maximum leverage allowed, please lower your leverage level.")]
    LowerLeverage { label: &'static str },

    #[error("{0} quote expired, please go back and retry.")]
    QuoteExpired(RouteType),

    // ── Arithmetic ────────────────────────────────────
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
}

impl SdkError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SdkError::Validation(msg.into())
    }

    pub fn provider(provider: RouteType, reason: impl std::fmt::Display) -> Self {
        SdkError::Provider { provider, reason: reason.to_string() }
    }

    pub fn decode(call: &'static str, reason: impl std::fmt::Display) -> Self {
        SdkError::Decode { call, reason: reason.to_string() }
    }
}

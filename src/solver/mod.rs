//! Leverage Solver
//!
//! Turns a target leverage into flash-loan router calls. Each side (long
//! and short) has three modes: open/add, close/remove (including a full
//! close at leverage 0) and down-leverage. Every mode evaluates every
//! provider route independently; a route that breaks the pool's debt-ratio
//! bounds is dropped without aborting the others.

pub mod long;
pub mod short;

use crate::aggregator::{default_targets, Aggregator, RouteResult, RouteType};
use crate::chain;
use crate::contracts::{IMultiPathConverter, MULTI_PATH_CONVERTER};
use crate::error::{Result, SdkError};
use crate::math::{mul_div, range_with_slippage, PRECISION};
use crate::pool::PoolInfo;
use crate::router::ConvertData;
use alloy_primitives::{uint, Address, Bytes, U256};
use alloy_sol_types::SolValue;
use serde::Serialize;
use tracing::{debug, warn};

/// Band around the anchor price used for the on-chain debt-ratio bounds (bps)
pub const DEBT_RATIO_SLIPPAGE_BPS: u64 = 30;

/// Added to the repaid debt on a full close
pub const CLOSE_EPSILON: U256 = uint!(1000000000_U256);

/// Added to withdrawals when down-leveraging
pub const WITHDRAW_EPSILON: U256 = uint!(10000000000_U256);

/// One provider's fully-evaluated flash-loan trade
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashLoanQuote {
    pub route_type: RouteType,
    /// Leverage as reported to the user
    pub leverage: f64,
    /// Input floor on open, output floor on close
    pub min_out: U256,
    /// 1e18 fixed point
    pub execution_price: U256,
    /// Percent deviation from the pool's open or close price
    pub price_impact: f64,
    pub colls: U256,
    pub debts: U256,
    /// Encoded router facet call
    #[serde(skip)]
    pub call_data: Bytes,
}

/// Inputs to an open/add solve
#[derive(Debug, Clone)]
pub struct OpenRequest<'a> {
    pub pool: &'a PoolInfo,
    pub token_in: Address,
    pub position_id: U256,
    pub amount_in: U256,
    /// Zap path from `token_in` to the pool's input token, empty if none
    pub convert_in: ConvertData,
    pub current_colls: U256,
    pub current_debts: U256,
    /// Internal leverage: shorts already carry the +1
    pub leverage: f64,
    pub slippage_bps: u64,
    pub targets: Vec<RouteType>,
}

/// Inputs to a close/remove or down-leverage solve
#[derive(Debug, Clone)]
pub struct CloseRequest<'a> {
    pub pool: &'a PoolInfo,
    pub token_out: Address,
    pub position_id: U256,
    /// Collateral to release: 1e18-scaled collateral token for longs, fxUSD for shorts
    pub withdraw_amount: U256,
    /// Zap path from the pool's output token to `token_out`, empty if none
    pub convert_out: ConvertData,
    pub current_colls: U256,
    pub current_debts: U256,
    /// 0 means full close
    pub leverage: f64,
    pub slippage_bps: u64,
    pub targets: Vec<RouteType>,
}

impl CloseRequest<'_> {
    pub fn is_full_close(&self) -> bool {
        self.leverage == 0.0
    }
}

pub struct LeverageSolver<'a> {
    aggregator: &'a Aggregator,
}

impl<'a> LeverageSolver<'a> {
    pub fn new(aggregator: &'a Aggregator) -> Self {
        Self { aggregator }
    }

    pub async fn open_or_add(&self, request: &OpenRequest<'_>) -> Result<Vec<FlashLoanQuote>> {
        if request.pool.config.is_short {
            short::open_or_add(self.aggregator, request).await
        } else {
            long::open_or_add(self.aggregator, request).await
        }
    }

    pub async fn close_or_remove(&self, request: &CloseRequest<'_>) -> Result<Vec<FlashLoanQuote>> {
        if request.pool.config.is_short {
            short::close_or_remove(self.aggregator, request).await
        } else {
            long::close_or_remove(self.aggregator, request).await
        }
    }

    pub async fn down_leverage(&self, request: &CloseRequest<'_>) -> Result<Vec<FlashLoanQuote>> {
        if request.pool.config.is_short {
            short::down_leverage(self.aggregator, request).await
        } else {
            long::down_leverage(self.aggregator, request).await
        }
    }
}

// ============================================
// SHARED HELPERS
// ============================================

/// Caller targets, or the per-token defaults when none were given
pub(crate) fn route_targets(token: Address, targets: &[RouteType]) -> Vec<RouteType> {
    if targets.is_empty() {
        default_targets(token)
    } else {
        targets.to_vec()
    }
}

pub(crate) fn require_prices(pool: &PoolInfo) -> Result<()> {
    if pool.prices.average.is_zero() || pool.oracle.anchor.is_zero() {
        return Err(SdkError::PriceNotFound(pool.config.name.to_string()));
    }
    Ok(())
}

/// Converter output for `amount` along `convert`; an empty path is identity.
pub(crate) async fn query_convert(aggregator: &Aggregator, amount: U256, convert: &ConvertData) -> Result<U256> {
    if convert.is_empty() {
        return Ok(amount);
    }
    chain::read(
        aggregator.chain().as_ref(),
        MULTI_PATH_CONVERTER,
        IMultiPathConverter::queryConvertCall {
            amountIn: amount,
            encoding: convert.encoding,
            routes: convert.routes.clone(),
        },
    )
    .await
}

/// `(min, max)` debt ratio at `anchor ± DEBT_RATIO_SLIPPAGE`.
///
/// The highest price yields the lowest ratio.
pub(crate) fn debt_ratio_band<F>(anchor: U256, ratio_at: F) -> Result<(U256, U256)>
where
    F: Fn(U256) -> Result<U256>,
{
    let (low_price, high_price) = range_with_slippage(anchor, DEBT_RATIO_SLIPPAGE_BPS)?;
    Ok((ratio_at(high_price)?, ratio_at(low_price)?))
}

/// Reject a debt ratio outside the pool's bounds with the directional message.
pub(crate) fn check_debt_ratio(pool: &PoolInfo, ratio: U256) -> Result<()> {
    let label = pool.config.label();
    if ratio < pool.data.min_debt_ratio {
        return Err(SdkError::IncreaseLeverage { label });
    }
    if ratio > pool.data.max_debt_ratio {
        return Err(SdkError::LowerLeverage { label });
    }
    Ok(())
}

/// `fx · precision · 1e18 / (amount · rate)`: fxUSD per unit of the underlying asset
pub(crate) fn execution_price(fx_usd: U256, amount: U256, pool: &PoolInfo) -> Result<U256> {
    let numerator = fx_usd
        .checked_mul(pool.config.precision)
        .ok_or(SdkError::Overflow("execution price"))?;
    let denominator = amount.checked_mul(pool.rate).ok_or(SdkError::Overflow("execution price"))?;
    mul_div(numerator, PRECISION, denominator)
}

pub(crate) fn nonzero_output(route: &RouteResult) -> Result<()> {
    if route.dst.is_zero() {
        return Err(SdkError::provider(route.route_type, "zero output amount"));
    }
    Ok(())
}

/// Router payload `(misc, amount, swapTarget, swapData)`
pub(crate) fn encode_payload(misc: U256, amount: U256, to: Address, data: &Bytes) -> Bytes {
    (misc, amount, to, data.clone()).abi_encode_params().into()
}

/// `convert(tokenIn, amountIn, ...)` calldata for the router's input leg
pub(crate) fn convert_in_call(token_in: Address, amount: U256, convert: &ConvertData) -> Bytes {
    use alloy_sol_types::SolCall;
    IMultiPathConverter::convertCall {
        tokenIn: token_in,
        amountIn: amount,
        encoding: convert.encoding,
        routes: convert.routes.clone(),
    }
    .abi_encode()
    .into()
}

/// The error reported when no route survives: FxRoute's own failure,
/// else the first failure, else no route at all.
pub(crate) fn representative_error(mut failures: Vec<(RouteType, SdkError)>) -> SdkError {
    if let Some(i) = failures.iter().position(|(rt, _)| *rt == RouteType::FxRoute) {
        return failures.swap_remove(i).1;
    }
    if failures.is_empty() {
        SdkError::NoRoute
    } else {
        failures.swap_remove(0).1
    }
}

/// Split per-route outcomes into survivors, failing with the representative error if none survive.
pub(crate) fn collect_routes(outcomes: Vec<(RouteType, Result<FlashLoanQuote>)>) -> Result<Vec<FlashLoanQuote>> {
    let mut quotes = Vec::new();
    let mut failures = Vec::new();
    for (route_type, outcome) in outcomes {
        match outcome {
            Ok(quote) => {
                debug!(
                    "✅ {} route: leverage {:.4}, price {}, impact {:.4}%",
                    route_type, quote.leverage, quote.execution_price, quote.price_impact
                );
                quotes.push(quote);
            }
            Err(e) => {
                warn!("❌ {} route rejected: {}", route_type, e);
                failures.push((route_type, e));
            }
        }
    }
    if quotes.is_empty() {
        return Err(representative_error(failures));
    }
    Ok(quotes)
}

pub(crate) fn sort_by_min_out(quotes: &mut [FlashLoanQuote]) {
    quotes.sort_by(|a, b| b.min_out.cmp(&a.min_out));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolName;
    use crate::testing::pool_info;
    use crate::tokens::{WBTC, WSTETH};

    fn e16(units: u64) -> U256 {
        U256::from(units) * U256::from(10_000_000_000_000_000u64)
    }

    #[test]
    fn test_representative_error_prefers_fx_route() {
        let failures = vec![
            (RouteType::Velora, SdkError::provider(RouteType::Velora, "down")),
            (RouteType::FxRoute, SdkError::LowerLeverage { label: "xPOSITION" }),
        ];
        assert!(matches!(representative_error(failures), SdkError::LowerLeverage { .. }));

        let failures = vec![(RouteType::Odos, SdkError::CannotCloseOrRemove)];
        assert!(matches!(representative_error(failures), SdkError::CannotCloseOrRemove));
        assert!(matches!(representative_error(vec![]), SdkError::NoRoute));
    }

    #[test]
    fn test_debt_ratio_bounds_are_directional() {
        let pool = pool_info(PoolName::WstEth, 2);
        assert!(check_debt_ratio(&pool, e16(60)).is_ok());

        let err = check_debt_ratio(&pool, e16(40)).unwrap_err();
        assert!(err.to_string().starts_with("Your xPOSITION leverage is lower"));

        let short = pool_info(PoolName::WbtcShort, 2);
        let err = check_debt_ratio(&short, e16(90)).unwrap_err();
        assert!(err.to_string().starts_with("Your sPOSITION leverage is higher"));
    }

    #[test]
    fn test_band_uses_opposite_price_edges() {
        // ratio inversely proportional to price
        let (min, max) = debt_ratio_band(PRECISION, |p| Ok(PRECISION * PRECISION / p)).unwrap();
        assert!(min < PRECISION);
        assert!(max > PRECISION);
    }

    #[test]
    fn test_payload_layout() {
        let data = Bytes::from(vec![0xab; 4]);
        let payload = encode_payload(U256::from(7u64), U256::from(9u64), WSTETH, &data);
        let (misc, amount, to, bytes) =
            <(U256, U256, Address, Bytes)>::abi_decode_params(&payload).unwrap();
        assert_eq!(misc, U256::from(7u64));
        assert_eq!(amount, U256::from(9u64));
        assert_eq!(to, WSTETH);
        assert_eq!(bytes, data);
    }

    #[test]
    fn test_route_targets_default_per_token() {
        assert_eq!(route_targets(WBTC, &[]).len(), 4);
        assert_eq!(route_targets(WSTETH, &[RouteType::Odos]), vec![RouteType::Odos]);
    }
}

//! Short pools: collateral is fxUSD, debt is the volatile asset

use super::{
    check_debt_ratio, collect_routes, convert_in_call, debt_ratio_band, encode_payload, execution_price,
    nonzero_output, query_convert, require_prices, route_targets, sort_by_min_out, CloseRequest, FlashLoanQuote,
    OpenRequest, DEBT_RATIO_SLIPPAGE_BPS, WITHDRAW_EPSILON,
};
use crate::aggregator::{Aggregator, RouteRequest, RouteResult};
use crate::contracts::{
    ConvertInParams, ConvertOutParams, IShortPositionOperateFlashLoanFacet, MULTI_PATH_CONVERTER, ROUTER_DIAMOND,
};
use crate::error::{Result, SdkError};
use crate::math::{
    after_fee, checked_add, debt_ratio, encode_misc_data, encode_misc_data_with_slippage, f64_to_wad,
    gross_of_fee, haircut, inflate, mul_div, relative_change_pct, target_debt_ratio, PRECISION,
};
use crate::pool::PoolInfo;
use crate::tokens::FXUSD;
use alloy_primitives::{uint, Bytes, I256, U256};
use alloy_sol_types::SolCall;
use tracing::info;

/// 1e36
const PRECISION_SQUARED: U256 = uint!(1000000000000000000000000000000000000_U256);

/// Debt-token units per fxUSD at the average price (1e18 fixed point)
fn exchange_price(pool: &PoolInfo) -> Result<U256> {
    if pool.prices.average.is_zero() {
        return Err(SdkError::PriceNotFound(pool.config.name.to_string()));
    }
    Ok(PRECISION_SQUARED / pool.prices.average)
}

/// Raw debt-token amount to flash-borrow and sell when opening:
/// `(fx_in + C)·ex·(L − 1) − D·rate·L`, rescaled to token precision.
pub fn open_borrow_amount(fx_in: U256, colls: U256, debts: U256, leverage_wad: U256, pool: &PoolInfo) -> Result<U256> {
    let ex = exchange_price(pool)?;
    let value = mul_div(checked_add(fx_in, colls)?, ex, PRECISION)?;
    let gain = mul_div(value, leverage_wad.saturating_sub(PRECISION), PRECISION)?;
    let owed = mul_div(mul_div(debts, pool.rate, PRECISION)?, leverage_wad, PRECISION)?;
    let normalized = gain.checked_sub(owed).ok_or(SdkError::CannotOpenOrAdd)?;
    mul_div(normalized, pool.config.precision, pool.rate)
}

/// Raw debt-token amount to buy back:
/// all debt on a full close, else `D − (C − W)·ex·tdr / rate`.
pub fn close_debt_amount(
    colls: U256,
    debts: U256,
    withdraw: U256,
    target_ratio: U256,
    full_close: bool,
    pool: &PoolInfo,
) -> Result<U256> {
    let normalized = if full_close {
        debts
    } else {
        let ex = exchange_price(pool)?;
        let kept_colls = colls.checked_sub(withdraw).ok_or(SdkError::CannotCloseOrRemove)?;
        let kept_debt = mul_div(mul_div(kept_colls, ex, PRECISION)?, target_ratio, pool.rate)?;
        debts.checked_sub(kept_debt).ok_or(SdkError::CannotCloseOrRemove)?
    };
    mul_div(normalized, pool.config.precision, PRECISION)
}

/// fxUSD expected to buy `debt_amount` at the average price
fn fx_usd_hint(debt_amount: U256, pool: &PoolInfo) -> Result<U256> {
    let ex = exchange_price(pool)?;
    mul_div(mul_div(debt_amount, PRECISION, pool.config.precision)?, pool.rate, ex)
}

/// Raw debt-token amount in 1e18 scale
fn normalize_debt(amount: U256, pool: &PoolInfo) -> Result<U256> {
    mul_div(amount, PRECISION, pool.config.precision)
}

// ============================================
// OPEN / ADD
// ============================================

pub(super) async fn open_or_add(aggregator: &Aggregator, request: &OpenRequest<'_>) -> Result<Vec<FlashLoanQuote>> {
    let pool = request.pool;
    let config = &pool.config;
    require_prices(pool)?;

    let fx_in = if request.token_in == config.coll_token {
        request.amount_in
    } else {
        query_convert(aggregator, request.amount_in, &request.convert_in).await?
    };
    let min_in = haircut(fx_in, request.slippage_bps)?;

    let borrow = open_borrow_amount(
        fx_in,
        request.current_colls,
        request.current_debts,
        f64_to_wad(request.leverage),
        pool,
    )?;
    info!("🧮 Short open on {}: {} fxUSD in, borrow {} {}", config.name, fx_in, borrow, config.debt_symbol);

    let selection = aggregator
        .route(
            &RouteRequest {
                src: config.debt_token,
                dst: FXUSD,
                amount: borrow,
                slippage_bps: request.slippage_bps,
                receiver: ROUTER_DIAMOND,
            },
            &route_targets(config.debt_token, &request.targets),
        )
        .await?;

    let mut routes = selection.results;
    routes.sort_by(|a, b| b.dst.cmp(&a.dst));

    let outcomes = routes
        .iter()
        .map(|route| (route.route_type, open_route(request, route, fx_in, min_in, borrow)))
        .collect();
    collect_routes(outcomes)
}

fn open_route(
    request: &OpenRequest<'_>,
    route: &RouteResult,
    fx_in: U256,
    min_in: U256,
    borrow: U256,
) -> Result<FlashLoanQuote> {
    let pool = request.pool;
    let config = &pool.config;
    nonzero_output(route)?;

    let fx_usd = haircut(route.dst, request.slippage_bps)?;
    let execution_price = execution_price(route.dst, borrow, pool)?;
    let price_impact = -relative_change_pct(execution_price, pool.prices.open);

    let coll_rest = pool.coll_rest().unwrap_or(U256::ZERO);
    if fx_usd > coll_rest {
        return Err(SdkError::PositionCap { label: config.label() });
    }

    let debts_after = checked_add(request.current_debts, normalize_debt(borrow, pool)?)?;
    let colls_after = checked_add(after_fee(checked_add(fx_in, fx_usd)?, pool.open_fee())?, request.current_colls)?;
    let ratio_at = |price: U256| debt_ratio(debts_after, colls_after, price);

    let (min_ratio, max_ratio) = debt_ratio_band(pool.oracle.anchor, ratio_at)?;
    check_debt_ratio(pool, ratio_at(pool.oracle.min)?)?;

    let payload = encode_payload(encode_misc_data(min_ratio, max_ratio), fx_usd, route.to, &route.data);
    let call_data = IShortPositionOperateFlashLoanFacet::openOrAddShortPositionFlashLoanCall {
        params: ConvertInParams {
            tokenIn: request.token_in,
            amount: request.amount_in,
            target: MULTI_PATH_CONVERTER,
            data: convert_in_call(request.token_in, request.amount_in, &request.convert_in),
            minOut: min_in,
            signature: Bytes::new(),
        },
        pool: config.pool_address,
        positionId: request.position_id,
        borrowAmount: borrow,
        data: payload,
    }
    .abi_encode();

    Ok(FlashLoanQuote {
        route_type: route.route_type,
        leverage: request.leverage - 1.0,
        min_out: min_in,
        execution_price,
        price_impact,
        colls: colls_after,
        debts: debts_after,
        call_data: call_data.into(),
    })
}

// ============================================
// CLOSE / REMOVE
// ============================================

/// Search and route for buying back `debt_amount`; returns `(fx_swap, routes)`.
async fn buy_back_routes(
    aggregator: &Aggregator,
    request: &CloseRequest<'_>,
    debt_amount: U256,
) -> Result<(U256, Vec<RouteResult>)> {
    let pool = request.pool;
    let config = &pool.config;

    let hint = fx_usd_hint(debt_amount, pool)?;
    let found = aggregator
        .fx_usd_by_borrow_amount(hint, debt_amount, config.debt_token)
        .await?;
    let fx_swap = inflate(found.src, request.slippage_bps)?;

    let selection = aggregator
        .route(
            &RouteRequest {
                src: FXUSD,
                dst: config.debt_token,
                amount: fx_swap,
                slippage_bps: request.slippage_bps,
                receiver: ROUTER_DIAMOND,
            },
            &route_targets(config.debt_token, &request.targets),
        )
        .await?;

    let mut routes = selection.results;
    routes.sort_by(|a, b| b.dst.cmp(&a.dst));
    Ok((fx_swap, routes))
}

pub(super) async fn close_or_remove(aggregator: &Aggregator, request: &CloseRequest<'_>) -> Result<Vec<FlashLoanQuote>> {
    let pool = request.pool;
    require_prices(pool)?;

    let full_close = request.is_full_close();
    let target_ratio = target_debt_ratio(f64_to_wad(request.leverage))?;
    let withdraw = if full_close { request.current_colls } else { request.withdraw_amount };
    if withdraw > request.current_colls {
        return Err(SdkError::CannotCloseOrRemove);
    }

    let debt_amount = close_debt_amount(
        request.current_colls,
        request.current_debts,
        withdraw,
        target_ratio,
        full_close,
        pool,
    )?;
    let (fx_swap, routes) = buy_back_routes(aggregator, request, debt_amount).await?;
    info!(
        "🧮 Short close on {}: buy back {} {} for ~{} fxUSD",
        pool.config.name, debt_amount, pool.config.debt_symbol, fx_swap
    );

    let mut outcomes = Vec::with_capacity(routes.len());
    for route in &routes {
        let outcome = close_route(aggregator, request, route, withdraw, debt_amount, fx_swap, target_ratio).await;
        outcomes.push((route.route_type, outcome));
    }

    let mut quotes = collect_routes(outcomes)?;
    sort_by_min_out(&mut quotes);
    Ok(quotes)
}

async fn close_route(
    aggregator: &Aggregator,
    request: &CloseRequest<'_>,
    route: &RouteResult,
    withdraw: U256,
    debt_amount: U256,
    fx_swap: U256,
    target_ratio: U256,
) -> Result<FlashLoanQuote> {
    let pool = request.pool;
    let config = &pool.config;
    let full_close = request.is_full_close();
    nonzero_output(route)?;

    let borrow = if full_close {
        checked_add(debt_amount, U256::from(1u64))?
    } else {
        haircut(route.dst, request.slippage_bps)?
    };
    let execution_price = execution_price(fx_swap, route.dst, pool)?;
    let price_impact = relative_change_pct(execution_price, pool.prices.close);

    let expected = after_fee(withdraw, pool.close_fee())?
        .checked_sub(fx_swap)
        .ok_or(SdkError::CannotCloseOrRemove)?;
    let out = if request.token_out == config.coll_token {
        expected
    } else {
        query_convert(aggregator, expected, &request.convert_out).await?
    };
    let min_out = haircut(out, request.slippage_bps)?;

    let left_colls = request.current_colls - withdraw;
    let left_debts = request
        .current_debts
        .checked_sub(normalize_debt(borrow, pool)?)
        .ok_or(SdkError::CannotCloseOrRemove);

    let misc = if full_close {
        encode_misc_data_with_slippage(target_ratio, DEBT_RATIO_SLIPPAGE_BPS)?
    } else {
        let left_debts = left_debts?;
        let ratio_at = |price: U256| debt_ratio(left_debts, left_colls, price);
        let (min_ratio, max_ratio) = debt_ratio_band(pool.oracle.anchor, ratio_at)?;
        check_debt_ratio(pool, ratio_at(pool.oracle.min)?)?;
        encode_misc_data(min_ratio, max_ratio)
    };

    let amount_out = if full_close {
        I256::MIN
    } else {
        I256::try_from(withdraw).map_err(|_| SdkError::Overflow("withdraw amount"))?
    };

    let call_data = IShortPositionOperateFlashLoanFacet::closeOrRemoveShortPositionFlashLoanCall {
        params: ConvertOutParams {
            tokenOut: request.token_out,
            converter: MULTI_PATH_CONVERTER,
            encodings: request.convert_out.encoding,
            routes: request.convert_out.routes.clone(),
            minOut: min_out,
            signature: Bytes::new(),
        },
        pool: config.pool_address,
        positionId: request.position_id,
        amountOut: amount_out,
        borrowAmount: borrow,
        data: encode_payload(misc, fx_swap, route.to, &route.data),
    }
    .abi_encode();

    let (colls, debts) = if full_close {
        (U256::ZERO, U256::ZERO)
    } else {
        (left_colls, request.current_debts.saturating_sub(normalize_debt(borrow, pool)?))
    };

    Ok(FlashLoanQuote {
        route_type: route.route_type,
        leverage: (request.leverage - 1.0).max(0.0),
        min_out,
        execution_price,
        price_impact,
        colls,
        debts,
        call_data: call_data.into(),
    })
}

// ============================================
// DOWN-LEVERAGE
// ============================================

pub(super) async fn down_leverage(aggregator: &Aggregator, request: &CloseRequest<'_>) -> Result<Vec<FlashLoanQuote>> {
    let pool = request.pool;
    require_prices(pool)?;

    if request.withdraw_amount > request.current_colls {
        return Err(SdkError::CannotCloseOrRemove);
    }
    let target_ratio = target_debt_ratio(f64_to_wad(request.leverage))?;
    let debt_amount = close_debt_amount(
        request.current_colls,
        request.current_debts,
        request.withdraw_amount,
        target_ratio,
        false,
        pool,
    )?;
    let (fx_swap, routes) = buy_back_routes(aggregator, request, debt_amount).await?;

    // everything swapped is withdrawn from collateral, grossed up for the close fee
    let withdraw = checked_add(gross_of_fee(fx_swap, pool.close_fee())?, WITHDRAW_EPSILON)?;
    info!(
        "🧮 Short down-leverage on {}: buy back {} {}, withdraw {} fxUSD",
        pool.config.name, debt_amount, pool.config.debt_symbol, withdraw
    );

    let outcomes = routes
        .iter()
        .map(|route| (route.route_type, down_leverage_route(request, route, withdraw, fx_swap)))
        .collect();
    collect_routes(outcomes)
}

fn down_leverage_route(
    request: &CloseRequest<'_>,
    route: &RouteResult,
    withdraw: U256,
    fx_swap: U256,
) -> Result<FlashLoanQuote> {
    let pool = request.pool;
    let config = &pool.config;
    nonzero_output(route)?;

    let borrow = haircut(route.dst, request.slippage_bps)?;
    let execution_price = execution_price(fx_swap, route.dst, pool)?;
    let price_impact = relative_change_pct(execution_price, pool.prices.close);

    let left_colls = request
        .current_colls
        .checked_sub(withdraw)
        .ok_or(SdkError::CannotCloseOrRemove)?;
    let left_debts = request
        .current_debts
        .checked_sub(normalize_debt(borrow, pool)?)
        .ok_or(SdkError::CannotCloseOrRemove)?;
    let ratio_at = |price: U256| debt_ratio(left_debts, left_colls, price);
    let (min_ratio, max_ratio) = debt_ratio_band(pool.oracle.anchor, ratio_at)?;
    check_debt_ratio(pool, ratio_at(pool.oracle.min)?)?;

    let call_data = IShortPositionOperateFlashLoanFacet::closeOrRemoveShortPositionFlashLoanCall {
        params: ConvertOutParams {
            tokenOut: request.token_out,
            converter: MULTI_PATH_CONVERTER,
            encodings: request.convert_out.encoding,
            routes: request.convert_out.routes.clone(),
            minOut: U256::ZERO,
            signature: Bytes::new(),
        },
        pool: config.pool_address,
        positionId: request.position_id,
        amountOut: I256::try_from(withdraw).map_err(|_| SdkError::Overflow("withdraw amount"))?,
        borrowAmount: borrow,
        data: encode_payload(encode_misc_data(min_ratio, max_ratio), fx_swap, route.to, &route.data),
    }
    .abi_encode();

    Ok(FlashLoanQuote {
        route_type: route.route_type,
        leverage: request.leverage - 1.0,
        min_out: U256::ZERO,
        execution_price,
        price_impact,
        colls: left_colls,
        debts: left_debts,
        call_data: call_data.into(),
    })
}

//! Long pools: collateral is the volatile asset, debt is fxUSD

use super::{
    check_debt_ratio, collect_routes, convert_in_call, debt_ratio_band, encode_payload, execution_price,
    nonzero_output, query_convert, require_prices, route_targets, sort_by_min_out, CloseRequest, FlashLoanQuote,
    OpenRequest, CLOSE_EPSILON, DEBT_RATIO_SLIPPAGE_BPS, WITHDRAW_EPSILON,
};
use crate::aggregator::{Aggregator, RouteRequest, RouteResult};
use crate::contracts::{
    ConvertInParams, ConvertOutParams, IPositionOperateFlashLoanFacetV2, MULTI_PATH_CONVERTER, ROUTER_DIAMOND,
};
use crate::error::{Result, SdkError};
use crate::math::{
    after_fee, checked_add, debt_ratio, encode_misc_data, encode_misc_data_with_slippage, f64_to_wad,
    gross_of_fee, haircut, inflate, mul_div, mul_div_round, relative_change_pct, target_debt_ratio, PRECISION,
};
use crate::pool::PoolInfo;
use crate::tokens::FXUSD;
use alloy_primitives::{Bytes, I256, U256};
use alloy_sol_types::SolCall;
use tracing::info;

// ============================================
// CLOSED-FORM PIECES
// ============================================

/// fxUSD to borrow: `(delta·rate/precision + C)·avg·(L − 1) − D·L`.
///
/// Fails when the requested leverage cannot be reached with this collateral.
pub fn open_hint(
    delta_coll: U256,
    colls: U256,
    debts: U256,
    leverage_wad: U256,
    pool: &PoolInfo,
) -> Result<U256> {
    let normalized = mul_div(delta_coll, pool.rate, pool.config.precision)?;
    let value = mul_div(checked_add(normalized, colls)?, pool.prices.average, PRECISION)?;

    let gain = mul_div(value, leverage_wad.saturating_sub(PRECISION), PRECISION)?;
    let shortfall = mul_div(value, PRECISION.saturating_sub(leverage_wad), PRECISION)?;
    let owed = checked_add(shortfall, mul_div(debts, leverage_wad, PRECISION)?)?;

    gain.checked_sub(owed).ok_or(SdkError::CannotOpenOrAdd)
}

/// Collateral units an fxUSD amount buys at the average price.
pub fn collateral_for_fx_usd(fx_usd: U256, pool: &PoolInfo) -> Result<U256> {
    let scaled = mul_div(fx_usd, pool.config.precision, pool.rate)?;
    mul_div(scaled, PRECISION, pool.prices.average)
}

/// fxUSD to repay: `D − (C − W·rate/1e18)·avg·tdr`, within `[0, D]`.
pub fn close_fx_amount(colls: U256, debts: U256, withdraw: U256, target_ratio: U256, pool: &PoolInfo) -> Result<U256> {
    let released = mul_div(withdraw, pool.rate, PRECISION)?;
    let remaining = colls.checked_sub(released).ok_or(SdkError::CannotCloseOrRemove)?;
    let kept_debt = mul_div(mul_div(remaining, pool.prices.average, PRECISION)?, target_ratio, PRECISION)?;
    debts.checked_sub(kept_debt).ok_or(SdkError::CannotCloseOrRemove)
}

/// Collateral left after withdrawing `withdraw` (1e18-scaled token units).
fn remaining_colls(colls: U256, withdraw: U256, pool: &PoolInfo) -> Result<U256> {
    colls
        .checked_sub(mul_div(withdraw, pool.rate, PRECISION)?)
        .ok_or(SdkError::CannotCloseOrRemove)
}

// ============================================
// OPEN / ADD
// ============================================

pub(super) async fn open_or_add(aggregator: &Aggregator, request: &OpenRequest<'_>) -> Result<Vec<FlashLoanQuote>> {
    let pool = request.pool;
    let config = &pool.config;
    require_prices(pool)?;

    let delta_coll = if request.token_in == config.coll_token {
        request.amount_in
    } else {
        query_convert(aggregator, request.amount_in, &request.convert_in).await?
    };
    let min_in = haircut(delta_coll, request.slippage_bps)?;

    let leverage_wad = f64_to_wad(request.leverage);
    let hint = open_hint(delta_coll, request.current_colls, request.current_debts, leverage_wad, pool)?;
    let borrow_hint = collateral_for_fx_usd(hint, pool)?;

    let coll_rest = pool.coll_rest().unwrap_or(U256::ZERO);
    if checked_add(delta_coll, borrow_hint)? > coll_rest {
        return Err(SdkError::PositionCap { label: config.label() });
    }

    let found = aggregator
        .fx_usd_by_borrow_amount(hint, borrow_hint, config.coll_token)
        .await?;
    let fx_usd = inflate(found.src, request.slippage_bps)?;
    info!(
        "🧮 Long open on {}: hint {} fxUSD, borrow {}, flash {} fxUSD via {}",
        config.name, hint, borrow_hint, fx_usd, found.route_type
    );

    let selection = aggregator
        .route(
            &RouteRequest {
                src: FXUSD,
                dst: config.coll_token,
                amount: fx_usd,
                slippage_bps: request.slippage_bps,
                receiver: ROUTER_DIAMOND,
            },
            &route_targets(config.coll_token, &request.targets),
        )
        .await?;

    let mut routes = selection.results;
    routes.sort_by(|a, b| b.dst.cmp(&a.dst));

    let outcomes = routes
        .iter()
        .map(|route| (route.route_type, open_route(request, route, delta_coll, min_in, fx_usd)))
        .collect();
    collect_routes(outcomes)
}

fn open_route(
    request: &OpenRequest<'_>,
    route: &RouteResult,
    delta_coll: U256,
    min_in: U256,
    fx_usd: U256,
) -> Result<FlashLoanQuote> {
    let pool = request.pool;
    let config = &pool.config;
    nonzero_output(route)?;

    let borrow = haircut(route.dst, request.slippage_bps)?;
    let execution_price = execution_price(fx_usd, route.dst, pool)?;
    let price_impact = relative_change_pct(execution_price, pool.prices.open);

    let debt_rest = pool.debt_rest().unwrap_or(U256::ZERO);
    if fx_usd > debt_rest {
        return Err(SdkError::PositionCap { label: config.label() });
    }

    let gross = checked_add(borrow, delta_coll)?;
    let net = after_fee(gross, pool.open_fee())?;
    let colls_after = checked_add(mul_div(net, pool.rate, config.precision)?, request.current_colls)?;
    let debts_after = checked_add(request.current_debts, fx_usd)?;
    let ratio_at = |price: U256| debt_ratio(debts_after, colls_after, price);

    let (min_ratio, max_ratio) = debt_ratio_band(pool.oracle.anchor, ratio_at)?;
    check_debt_ratio(pool, ratio_at(pool.oracle.min)?)?;

    let payload = encode_payload(encode_misc_data(min_ratio, max_ratio), fx_usd, route.to, &route.data);
    let call_data = IPositionOperateFlashLoanFacetV2::openOrAddPositionFlashLoanV2Call {
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
        leverage: request.leverage,
        min_out: min_in,
        execution_price,
        price_impact,
        colls: checked_add(mul_div(net, PRECISION, config.precision)?, request.current_colls)?,
        debts: debts_after,
        call_data: call_data.into(),
    })
}

// ============================================
// CLOSE / REMOVE
// ============================================

pub(super) async fn close_or_remove(aggregator: &Aggregator, request: &CloseRequest<'_>) -> Result<Vec<FlashLoanQuote>> {
    let pool = request.pool;
    let config = &pool.config;
    require_prices(pool)?;

    let full_close = request.is_full_close();
    let leverage_wad = f64_to_wad(request.leverage);
    let target_ratio = target_debt_ratio(leverage_wad)?;
    let (colls, debts) = (request.current_colls, request.current_debts);

    let (fx_usd, withdraw) = if full_close {
        (debts, mul_div(colls, PRECISION, pool.rate)?)
    } else {
        let fx_usd = close_fx_amount(colls, debts, request.withdraw_amount, target_ratio, pool)?;
        (fx_usd, request.withdraw_amount)
    };

    let hint = collateral_for_fx_usd(fx_usd, pool)?;
    let found = aggregator
        .borrow_by_fx_usd_amount(hint, fx_usd, config.coll_token, config.precision)
        .await?;
    let to_borrow = inflate(found.src, request.slippage_bps)?;
    info!(
        "🧮 Long close on {}: repay {} fxUSD, sell {} collateral via {}",
        config.name, fx_usd, to_borrow, found.route_type
    );

    let selection = aggregator
        .route(
            &close_route_request(request, to_borrow),
            &route_targets(config.coll_token, &request.targets),
        )
        .await?;

    let mut outcomes = Vec::with_capacity(selection.results.len());
    for route in &selection.results {
        let outcome = close_route(aggregator, request, route, withdraw, to_borrow, target_ratio).await;
        outcomes.push((route.route_type, outcome));
    }

    let mut quotes = collect_routes(outcomes)?;
    sort_by_min_out(&mut quotes);
    Ok(quotes)
}

fn close_route_request(request: &CloseRequest<'_>, amount: U256) -> RouteRequest {
    RouteRequest {
        src: request.pool.config.coll_token,
        dst: FXUSD,
        amount,
        slippage_bps: request.slippage_bps,
        receiver: ROUTER_DIAMOND,
    }
}

async fn close_route(
    aggregator: &Aggregator,
    request: &CloseRequest<'_>,
    route: &RouteResult,
    withdraw: U256,
    to_borrow: U256,
    target_ratio: U256,
) -> Result<FlashLoanQuote> {
    let pool = request.pool;
    let config = &pool.config;
    let full_close = request.is_full_close();
    let (colls, debts) = (request.current_colls, request.current_debts);
    nonzero_output(route)?;

    let mut repay = haircut(route.dst, request.slippage_bps)?;
    let mut borrow = to_borrow;
    let mut swap = route.clone();

    if full_close {
        if repay < debts && !repay.is_zero() {
            borrow = mul_div(debts, to_borrow, repay)?;
        }
        if repay > debts {
            // one corrected quote from the same provider, sized to the exact debt
            let corrected = inflate(mul_div(debts, to_borrow, route.dst)?, request.slippage_bps)?;
            let requote = aggregator
                .route(&close_route_request(request, corrected), &[route.route_type])
                .await;
            if let Ok(selection) = requote {
                if selection.best == route.route_type {
                    if let Some(fresh) = selection.best_result() {
                        if fresh.dst > debts {
                            borrow = corrected;
                        }
                        swap = fresh.clone();
                    }
                }
            }
        }
        if borrow > mul_div(colls, PRECISION, pool.rate)? {
            return Err(SdkError::QuoteExpired(route.route_type));
        }
        repay = debts;
    }

    let execution_price = execution_price(swap.dst, borrow, pool)?;
    let price_impact = -relative_change_pct(execution_price, pool.prices.close);

    let withdrawn = after_fee(mul_div(withdraw, config.precision, PRECISION)?, pool.close_fee())?;
    let expected = withdrawn.checked_sub(borrow).ok_or(SdkError::CannotCloseOrRemove)?;
    let out = if request.token_out == config.coll_token {
        expected
    } else {
        query_convert(aggregator, expected, &request.convert_out).await?
    };
    let min_out = haircut(out, request.slippage_bps)?;

    let left_colls = remaining_colls(colls, withdraw, pool)?;
    let misc = if full_close {
        encode_misc_data_with_slippage(target_ratio, DEBT_RATIO_SLIPPAGE_BPS)?
    } else {
        let left_debts = debts.checked_sub(repay).ok_or(SdkError::CannotCloseOrRemove)?;
        let ratio_at = |price: U256| debt_ratio(left_debts, left_colls, price);
        let (min_ratio, max_ratio) = debt_ratio_band(pool.oracle.anchor, ratio_at)?;
        check_debt_ratio(pool, ratio_at(pool.oracle.min)?)?;
        encode_misc_data(min_ratio, max_ratio)
    };

    let amount_out = if full_close {
        I256::MIN
    } else {
        let raw = mul_div_round(checked_add(withdraw, CLOSE_EPSILON)?, config.precision, PRECISION)?;
        I256::try_from(raw).map_err(|_| SdkError::Overflow("withdraw amount"))?
    };

    let call_data = IPositionOperateFlashLoanFacetV2::closeOrRemovePositionFlashLoanV2Call {
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
        data: encode_payload(misc, repay, swap.to, &swap.data),
    }
    .abi_encode();

    let (display_colls, display_debts) = if full_close {
        (U256::ZERO, U256::ZERO)
    } else {
        (left_colls, debts.saturating_sub(repay))
    };

    Ok(FlashLoanQuote {
        route_type: route.route_type,
        leverage: request.leverage,
        min_out,
        execution_price,
        price_impact,
        colls: display_colls,
        debts: display_debts,
        call_data: call_data.into(),
    })
}

// ============================================
// DOWN-LEVERAGE
// ============================================

pub(super) async fn down_leverage(aggregator: &Aggregator, request: &CloseRequest<'_>) -> Result<Vec<FlashLoanQuote>> {
    let pool = request.pool;
    let config = &pool.config;
    require_prices(pool)?;

    let target_ratio = target_debt_ratio(f64_to_wad(request.leverage))?;
    let fx_usd = close_fx_amount(
        request.current_colls,
        request.current_debts,
        request.withdraw_amount,
        target_ratio,
        pool,
    )?;

    let hint = collateral_for_fx_usd(fx_usd, pool)?;
    let found = aggregator
        .borrow_by_fx_usd_amount(hint, fx_usd, config.coll_token, config.precision)
        .await?;
    let to_borrow = inflate(found.src, request.slippage_bps)?;

    let selection = aggregator
        .route(
            &close_route_request(request, to_borrow),
            &route_targets(config.coll_token, &request.targets),
        )
        .await?;

    // everything sold is withdrawn, grossed up for the close fee
    let withdraw = checked_add(
        gross_of_fee(mul_div(to_borrow, PRECISION, config.precision)?, pool.close_fee())?,
        WITHDRAW_EPSILON,
    )?;
    info!(
        "🧮 Long down-leverage on {}: repay ~{} fxUSD, withdraw {}",
        config.name, fx_usd, withdraw
    );

    let mut routes = selection.results;
    routes.sort_by(|a, b| b.dst.cmp(&a.dst));

    let outcomes = routes
        .iter()
        .map(|route| (route.route_type, down_leverage_route(request, route, withdraw, to_borrow)))
        .collect();
    collect_routes(outcomes)
}

fn down_leverage_route(
    request: &CloseRequest<'_>,
    route: &RouteResult,
    withdraw: U256,
    to_borrow: U256,
) -> Result<FlashLoanQuote> {
    let pool = request.pool;
    let config = &pool.config;
    nonzero_output(route)?;

    let repay = haircut(route.dst, request.slippage_bps)?;
    let execution_price = execution_price(route.dst, to_borrow, pool)?;
    let price_impact = relative_change_pct(execution_price, pool.prices.close);

    let left_colls = remaining_colls(request.current_colls, withdraw, pool)?;
    let left_debts = request
        .current_debts
        .checked_sub(repay)
        .ok_or(SdkError::CannotCloseOrRemove)?;
    let ratio_at = |price: U256| debt_ratio(left_debts, left_colls, price);
    let (min_ratio, max_ratio) = debt_ratio_band(pool.oracle.anchor, ratio_at)?;
    check_debt_ratio(pool, ratio_at(pool.oracle.min)?)?;

    let amount_out = I256::try_from(mul_div_round(withdraw, config.precision, PRECISION)?)
        .map_err(|_| SdkError::Overflow("withdraw amount"))?;

    let call_data = IPositionOperateFlashLoanFacetV2::closeOrRemovePositionFlashLoanV2Call {
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
        amountOut: amount_out,
        borrowAmount: to_borrow,
        data: encode_payload(encode_misc_data(min_ratio, max_ratio), repay, route.to, &route.data),
    }
    .abi_encode();

    Ok(FlashLoanQuote {
        route_type: route.route_type,
        leverage: request.leverage,
        min_out: U256::ZERO,
        execution_price,
        price_impact,
        colls: left_colls,
        debts: left_debts,
        call_data: call_data.into(),
    })
}

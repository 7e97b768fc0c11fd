//! Position Orchestrator
//!
//! Reads a position, turns a user intent (increase, reduce, adjust,
//! deposit+mint, repay+withdraw) into solver requests and wraps every
//! surviving route into an ordered transaction list: token approval,
//! position approval, then the trade, with nonces counted up from the
//! user's pending nonce.

pub mod approve;

pub use approve::{approve_position, approve_token};

use crate::aggregator::{Aggregator, FxRouteProvider, QuoteProvider, QuoteRequest, RouteType};
use crate::chain::{self, ChainClient};
use crate::contracts::{
    ConvertInParams, ConvertOutParams, IPool, IPositionOperateFacet, IERC20, FX_MINT_ROUTER, MULTI_PATH_CONVERTER,
    ROUTER_DIAMOND,
};
use crate::error::{Result, SdkError};
use crate::math::{
    checked_add, f64_to_wad, leverage, mul_div, pow10, round_wad, slippage_to_bps, u256_to_f64, with_fee, PRECISION,
};
use crate::pool::{PoolInfo, MIN_PRECISION};
use crate::router::{self, ConvertData, RouterTable};
use crate::solver::{convert_in_call, CloseRequest, FlashLoanQuote, LeverageSolver, OpenRequest, CLOSE_EPSILON};
use crate::tokens::{is_native, known_decimals, routing_address, FXUSD};
use crate::types::{sequence, MintOutcome, RouteCandidate, RouteOutcome, Transaction, TxRequest};
use alloy_primitives::{Address, Bytes, I256, U256};
use alloy_sol_types::SolCall;
use serde::Serialize;
use tracing::info;

/// `min_out` on the mint router is 99.9% of the expected amount
const MINT_ROUTER_MIN_OUT_PER_MILLE: u64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub raw_colls: U256,
    pub raw_debts: U256,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionInfo {
    pub position_id: u64,
    pub raw_colls: U256,
    pub raw_debts: U256,
    pub current_leverage: f64,
    /// Leverage on the volatile asset: one less than `current_leverage` for shorts
    pub lsd_leverage: f64,
}

/// Operations on one position of one pool, on behalf of one user
pub struct Position<'a> {
    aggregator: &'a Aggregator,
    pool: &'a PoolInfo,
    position_id: u64,
    user: Address,
}

impl<'a> Position<'a> {
    pub fn new(aggregator: &'a Aggregator, pool: &'a PoolInfo, position_id: u64, user: Address) -> Self {
        Self { aggregator, pool, position_id, user }
    }

    fn chain(&self) -> &dyn ChainClient {
        self.aggregator.chain().as_ref()
    }

    fn solver(&self) -> LeverageSolver<'a> {
        LeverageSolver::new(self.aggregator)
    }

    // ============================================
    // READS
    // ============================================

    /// Raw collateral and debt. Position 0 is not opened yet and costs no RPC.
    pub async fn get_position(&self) -> Result<RawPosition> {
        if self.position_id == 0 {
            return Ok(RawPosition::default());
        }
        let position = chain::read(
            self.chain(),
            self.pool.config.pool_address,
            IPool::getPositionCall { tokenId: U256::from(self.position_id) },
        )
        .await?;
        Ok(RawPosition { raw_colls: position.rawColls, raw_debts: position.rawDebts })
    }

    pub async fn get_position_info(&self) -> Result<PositionInfo> {
        let raw = self.get_position().await?;
        let (current_leverage, lsd_leverage) = position_leverage(self.pool, raw)?;
        Ok(PositionInfo {
            position_id: self.position_id,
            raw_colls: raw.raw_colls,
            raw_debts: raw.raw_debts,
            current_leverage,
            lsd_leverage,
        })
    }

    // ============================================
    // FLASH-LOAN OPERATIONS
    // ============================================

    pub async fn increase_position(
        &self,
        input_token: Address,
        amount: U256,
        target_leverage: f64,
        slippage: f64,
        targets: &[RouteType],
    ) -> Result<RouteOutcome> {
        let config = &self.pool.config;
        let info = self.get_position_info().await?;

        let mut leverage = if config.is_short { target_leverage + 1.0 } else { target_leverage };
        let (delta, convert_in) = self.zap_in(input_token, amount).await?;

        if info.current_leverage > 0.0 {
            leverage = blend_leverage(self.pool, delta, leverage, info.current_leverage, info.raw_colls);
            info!("🔁 Adding to a {:.4}x position, blended target {:.4}x", info.current_leverage, leverage);
        }

        let quotes = self
            .solver()
            .open_or_add(&OpenRequest {
                pool: self.pool,
                token_in: input_token,
                position_id: U256::from(self.position_id),
                amount_in: amount,
                convert_in,
                current_colls: info.raw_colls,
                current_debts: info.raw_debts,
                leverage,
                slippage_bps: slippage_to_bps(slippage),
                targets: targets.to_vec(),
            })
            .await?;

        let mut approvals = Vec::new();
        approvals.extend(approve_token(self.chain(), input_token, amount, ROUTER_DIAMOND, self.user).await?);
        approvals.extend(self.position_approval(ROUTER_DIAMOND).await?);

        let value = if is_native(input_token) { amount } else { U256::ZERO };
        self.route_outcome(quotes, approvals, value, slippage, false).await
    }

    /// `amount` is collateral to release for longs and debt to repay for shorts.
    pub async fn reduce_position(
        &self,
        output_token: Address,
        amount: U256,
        slippage: f64,
        targets: &[RouteType],
        is_close: bool,
    ) -> Result<RouteOutcome> {
        let config = &self.pool.config;
        let info = self.get_position_info().await?;

        let withdraw_amount = if config.is_short {
            if is_close {
                info.raw_colls
            } else {
                short_withdraw_amount(self.pool, info.raw_colls, info.raw_debts, amount, info.lsd_leverage)?
            }
        } else {
            mul_div(amount, PRECISION, self.pool.rate)?
        };

        let leverage = if is_close { 0.0 } else { info.current_leverage };
        let convert_out = if output_token == config.coll_token {
            ConvertData::empty()
        } else {
            router::resolve(config.coll_token, routing_address(output_token), RouterTable::Legacy)?
        };

        let quotes = self
            .solver()
            .close_or_remove(&CloseRequest {
                pool: self.pool,
                token_out: output_token,
                position_id: U256::from(self.position_id),
                withdraw_amount,
                convert_out,
                current_colls: info.raw_colls,
                current_debts: info.raw_debts,
                leverage,
                slippage_bps: slippage_to_bps(slippage),
                targets: targets.to_vec(),
            })
            .await?;

        let approvals = self.position_approval(ROUTER_DIAMOND).await?.into_iter().collect();
        self.route_outcome(quotes, approvals, U256::ZERO, slippage, true).await
    }

    /// Move to `target_leverage`: open/add with no new funds when going up,
    /// down-leverage when going down.
    pub async fn adjust_position_leverage(&self, target_leverage: f64, slippage: f64, targets: &[RouteType]) -> Result<RouteOutcome> {
        let config = &self.pool.config;
        let info = self.get_position_info().await?;
        let leverage = if config.is_short { target_leverage + 1.0 } else { target_leverage };
        let slippage_bps = slippage_to_bps(slippage);

        let quotes = if target_leverage > info.lsd_leverage {
            self.solver()
                .open_or_add(&OpenRequest {
                    pool: self.pool,
                    token_in: config.coll_token,
                    position_id: U256::from(self.position_id),
                    amount_in: U256::ZERO,
                    convert_in: ConvertData::empty(),
                    current_colls: info.raw_colls,
                    current_debts: info.raw_debts,
                    leverage,
                    slippage_bps,
                    targets: targets.to_vec(),
                })
                .await?
        } else {
            let colls = if config.is_short {
                info.raw_colls
            } else {
                mul_div(info.raw_colls, PRECISION, self.pool.rate)?
            };
            let withdraw_amount = if info.current_leverage > 0.0 {
                mul_div(
                    colls,
                    f64_to_wad(info.current_leverage - leverage),
                    f64_to_wad(info.current_leverage),
                )?
            } else {
                U256::ZERO
            };

            self.solver()
                .down_leverage(&CloseRequest {
                    pool: self.pool,
                    token_out: config.coll_token,
                    position_id: U256::from(self.position_id),
                    withdraw_amount,
                    convert_out: ConvertData::empty(),
                    current_colls: info.raw_colls,
                    current_debts: info.raw_debts,
                    leverage,
                    slippage_bps,
                    targets: targets.to_vec(),
                })
                .await?
        };

        let approvals = self.position_approval(ROUTER_DIAMOND).await?.into_iter().collect();
        self.route_outcome(quotes, approvals, U256::ZERO, slippage, false).await
    }

    // ============================================
    // MINT ROUTER OPERATIONS (long only)
    // ============================================

    pub async fn deposit_and_mint(
        &self,
        deposit_token: Address,
        deposit_amount: U256,
        mint_amount: U256,
    ) -> Result<MintOutcome> {
        let config = &self.pool.config;
        if config.is_short {
            return Err(SdkError::validation("Deposit and mint only supports long positions"));
        }
        let info = self.get_position_info().await?;
        let min_price = self.pool.oracle.min;

        let (delta, convert) = if deposit_amount.is_zero() {
            (U256::ZERO, ConvertData::empty())
        } else {
            self.zap_in(deposit_token, deposit_amount).await?
        };

        let size = mul_div(mul_div(delta, min_price, PRECISION)?, self.pool.rate, config.precision)?;
        let total_size = checked_add(size, mul_div(info.raw_colls, min_price, PRECISION)?)?;
        let debts = checked_add(info.raw_debts, mint_amount)?;
        let colls = checked_add(info.raw_colls, mul_div(delta, self.pool.rate, config.precision)?)?;
        let min_out = mul_div(delta, U256::from(MINT_ROUTER_MIN_OUT_PER_MILLE), U256::from(1000u64))?;

        let call_data = IPositionOperateFacet::borrowFromLongCall {
            params: ConvertInParams {
                tokenIn: deposit_token,
                amount: deposit_amount,
                target: MULTI_PATH_CONVERTER,
                data: convert_in_call(deposit_token, deposit_amount, &convert),
                minOut: min_out,
                signature: Bytes::new(),
            },
            borrowParams: IPositionOperateFacet::BorrowParams {
                pool: config.pool_address,
                positionId: U256::from(self.position_id),
                borrowAmount: mint_amount,
            },
        }
        .abi_encode();

        let mut txs = Vec::new();
        txs.extend(approve_token(self.chain(), deposit_token, deposit_amount, FX_MINT_ROUTER, self.user).await?);
        txs.extend(self.position_approval(FX_MINT_ROUTER).await?);
        let value = if is_native(deposit_token) { deposit_amount } else { U256::ZERO };
        txs.push(TxRequest::trade(self.user, FX_MINT_ROUTER, call_data.into(), value));

        Ok(MintOutcome {
            position_id: self.position_id,
            leverage: leverage(total_size, debts),
            execution_price: round_wad(min_price),
            colls,
            debts,
            txs: self.sequence(txs).await?,
        })
    }

    pub async fn repay_and_withdraw(
        &self,
        repay_amount: U256,
        withdraw_amount: U256,
        withdraw_token: Address,
    ) -> Result<MintOutcome> {
        let config = &self.pool.config;
        if config.is_short {
            return Err(SdkError::validation("Repay and withdraw only supports long positions"));
        }
        let info = self.get_position_info().await?;
        let min_price = self.pool.oracle.min;

        let zap_out = withdraw_token != config.coll_token;
        let mut delta_coll = withdraw_amount;
        let mut convert = ConvertData::empty();
        if zap_out && !withdraw_amount.is_zero() {
            let decimals = self.decimals(withdraw_token).await?;
            delta_coll = mul_div(
                mul_div(withdraw_amount, PRECISION, pow10(decimals))?,
                config.precision,
                self.pool.rate,
            )?;
            convert = router::resolve(config.coll_token, routing_address(withdraw_token), RouterTable::Legacy)?;
        }

        let is_close = info.raw_debts <= repay_amount;
        let (delta_debt, withdrawn, target_leverage) = if is_close {
            (checked_add(info.raw_debts, CLOSE_EPSILON)?, info.raw_colls, 0.0)
        } else {
            let withdrawn = mul_div(delta_coll, self.pool.rate, config.precision)?;
            let size = mul_div(mul_div(delta_coll, min_price, PRECISION)?, self.pool.rate, config.precision)?;
            let total_size = mul_div(info.raw_colls, min_price, PRECISION)?.saturating_sub(size);
            (repay_amount, withdrawn, leverage(total_size, info.raw_debts - repay_amount))
        };

        let pay_amount = with_fee(delta_debt, self.pool.repay_fee())?;
        let min_out = mul_div(withdraw_amount, U256::from(MINT_ROUTER_MIN_OUT_PER_MILLE), U256::from(1000u64))?;

        let params = ConvertInParams {
            tokenIn: FXUSD,
            amount: pay_amount,
            target: MULTI_PATH_CONVERTER,
            data: convert_in_call(FXUSD, pay_amount, &ConvertData::empty()),
            minOut: delta_debt,
            signature: Bytes::new(),
        };
        let repay_params = IPositionOperateFacet::RepayParams {
            pool: config.pool_address,
            positionId: U256::from(self.position_id),
            withdrawAmount: delta_coll,
        };
        let call_data = if zap_out {
            IPositionOperateFacet::repayToLongAndZapOutCall {
                params,
                repayParams: repay_params,
                convertOut: ConvertOutParams {
                    tokenOut: withdraw_token,
                    converter: MULTI_PATH_CONVERTER,
                    encodings: convert.encoding,
                    routes: convert.routes,
                    minOut: min_out,
                    signature: Bytes::new(),
                },
            }
            .abi_encode()
        } else {
            IPositionOperateFacet::repayToLongCall { params, repayParams: repay_params }.abi_encode()
        };

        let mut txs = Vec::new();
        txs.extend(approve_token(self.chain(), FXUSD, pay_amount, FX_MINT_ROUTER, self.user).await?);
        txs.extend(self.position_approval(FX_MINT_ROUTER).await?);
        txs.push(TxRequest::trade(self.user, FX_MINT_ROUTER, call_data.into(), U256::ZERO));

        Ok(MintOutcome {
            position_id: self.position_id,
            leverage: target_leverage,
            execution_price: round_wad(min_price),
            colls: info.raw_colls.saturating_sub(withdrawn),
            debts: info.raw_debts.saturating_sub(delta_debt),
            txs: self.sequence(txs).await?,
        })
    }

    // ============================================
    // HELPERS
    // ============================================

    /// Quote `amount` of `token` into the pool's input token through the
    /// legacy converter paths. The pool's own token passes through unchanged.
    async fn zap_in(&self, token: Address, amount: U256) -> Result<(U256, ConvertData)> {
        let coll_token = self.pool.config.coll_token;
        if token == coll_token {
            return Ok((amount, ConvertData::empty()));
        }
        let provider = FxRouteProvider::new(self.aggregator.chain().clone(), RouterTable::Legacy);
        let quote = provider
            .get_quote(&QuoteRequest { src: routing_address(token), dst: coll_token, amount })
            .await?;
        Ok((quote.dst, quote.convert_data.unwrap_or_default()))
    }

    async fn position_approval(&self, operator: Address) -> Result<Option<TxRequest>> {
        approve_position(
            self.chain(),
            self.pool.config.pool_address,
            self.position_id,
            operator,
            self.user,
            false,
        )
        .await
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        if is_native(token) {
            return Ok(18);
        }
        if let Some(decimals) = known_decimals(token) {
            return Ok(decimals);
        }
        chain::read(self.chain(), token, IERC20::decimalsCall {}).await
    }

    async fn sequence(&self, txs: Vec<TxRequest>) -> Result<Vec<Transaction>> {
        let nonce = self.chain().get_nonce(self.user).await?;
        Ok(sequence(txs, nonce, self.chain().chain_id()))
    }

    /// One candidate per surviving quote, each with its own approvals + trade
    /// numbered from the same starting nonce.
    async fn route_outcome(
        &self,
        quotes: Vec<FlashLoanQuote>,
        approvals: Vec<TxRequest>,
        value: U256,
        slippage: f64,
        with_min_out: bool,
    ) -> Result<RouteOutcome> {
        let nonce = self.chain().get_nonce(self.user).await?;
        let chain_id = self.chain().chain_id();

        let routes = quotes
            .into_iter()
            .map(|quote| {
                let mut txs = approvals.clone();
                txs.push(TxRequest::trade(self.user, ROUTER_DIAMOND, quote.call_data, value));
                RouteCandidate {
                    route_type: quote.route_type,
                    leverage: quote.leverage,
                    execution_price: quote.execution_price,
                    min_out: with_min_out.then_some(quote.min_out),
                    colls: quote.colls,
                    debts: quote.debts,
                    txs: sequence(txs, nonce, chain_id),
                }
            })
            .collect();

        Ok(RouteOutcome { position_id: self.position_id, slippage, routes })
    }
}

// ============================================
// PURE PIECES
// ============================================

/// `(current, lsd)` leverage of a raw position. Dust positions count as closed.
pub fn position_leverage(pool: &PoolInfo, raw: RawPosition) -> Result<(f64, f64)> {
    let closed = raw.raw_colls < U256::from(5 * MIN_PRECISION);
    if closed {
        return Ok((0.0, 0.0));
    }

    let average = pool.prices.average;
    let (size, debt) = if pool.config.is_short {
        let debts = mul_div(raw.raw_debts, pool.rate, PRECISION)?;
        (raw.raw_colls, mul_div(debts, average, PRECISION)?)
    } else {
        (mul_div(raw.raw_colls, average, PRECISION)?, raw.raw_debts)
    };

    let current = leverage(size, debt);
    let lsd = if pool.config.is_short { current - 1.0 } else { current };
    Ok((current, lsd))
}

/// Target leverage for adding `delta` to an existing position so that the
/// whole position ends at `target`.
pub fn blend_leverage(pool: &PoolInfo, delta: U256, target: f64, current: f64, raw_colls: U256) -> f64 {
    let colls = u256_to_f64(raw_colls);
    let delta = if pool.config.is_short {
        u256_to_f64(delta)
    } else {
        u256_to_f64(delta) / u256_to_f64(pool.config.precision) * u256_to_f64(pool.rate)
    };
    let a = (delta * target + colls) * current;
    let b = delta * current + colls;
    a / b
}

/// Collateral to release when repaying `amount` of a short's debt:
/// `C − dr − dr / lsd` with `dr = (D·rate − amount)·avg`.
pub fn short_withdraw_amount(pool: &PoolInfo, colls: U256, debts: U256, amount: U256, lsd: f64) -> Result<U256> {
    let to_signed = |v: U256| I256::try_from(v).map_err(|_| SdkError::Overflow("short withdraw"));
    let overflow = || SdkError::Overflow("short withdraw");

    let lsd_wad = f64_to_wad(lsd);
    if lsd_wad.is_zero() {
        return Err(SdkError::CannotCloseOrRemove);
    }

    let normalized_debt = mul_div(debts, pool.rate, PRECISION)?;
    let debt_rest = to_signed(normalized_debt)? - to_signed(amount)?;
    let debt_rest_usd = debt_rest
        .checked_mul(to_signed(pool.prices.average)?)
        .ok_or_else(overflow)?
        / to_signed(PRECISION)?;
    let leveraged_part = debt_rest_usd.checked_mul(to_signed(PRECISION)?).ok_or_else(overflow)? / to_signed(lsd_wad)?;

    let withdraw = to_signed(colls)? - debt_rest_usd - leveraged_part;
    if withdraw.is_negative() {
        return Err(SdkError::CannotCloseOrRemove);
    }
    Ok(withdraw.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{IPositionOperateFlashLoanFacetV2, IShortPositionOperateFlashLoanFacet};
    use crate::pool::PoolName;
    use crate::testing::{fx_route_aggregator, pool_chain, pool_info, PoolState, USER};
    use crate::tokens::{ETH, STETH, WSTETH};
    use crate::types::TxKind;
    use std::sync::Arc;
    use alloy_sol_types::SolValue;

    fn e18(units: u64) -> U256 {
        U256::from(units) * PRECISION
    }

    fn e16(units: u64) -> U256 {
        U256::from(units) * U256::from(10_000_000_000_000_000u64)
    }

    fn aggregator_for(state: &PoolState, nonce: u64) -> Aggregator {
        aggregator_on(PoolName::WstEth, state, nonce)
    }

    fn aggregator_on(name: PoolName, state: &PoolState, nonce: u64) -> Aggregator {
        let chain: Arc<dyn ChainClient> = Arc::new(pool_chain(name, state).with_nonce(nonce));
        fx_route_aggregator(chain)
    }

    /// Short wstETH pool at 2 fxUSD per wstETH, oracle quoting wstETH per fxUSD
    fn short_pool() -> PoolInfo {
        let mut pool = pool_info(PoolName::WstEthShort, 2);
        let inverse = e18(1) / U256::from(2u64);
        pool.oracle.anchor = inverse;
        pool.oracle.min = inverse;
        pool.oracle.max = inverse;
        pool
    }

    #[test]
    fn test_long_leverage_from_raw_position() {
        let pool = pool_info(PoolName::WstEth, 2);
        let raw = RawPosition { raw_colls: e18(3), raw_debts: e18(4) };
        let (current, lsd) = position_leverage(&pool, raw).unwrap();
        assert!((current - 3.0).abs() < 1e-9);
        assert_eq!(current, lsd);
    }

    #[test]
    fn test_short_leverage_counts_the_extra_one() {
        let pool = pool_info(PoolName::WstEthShort, 2);
        // 6 fxUSD against 2 wstETH worth 4
        let raw = RawPosition { raw_colls: e18(6), raw_debts: e18(2) };
        let (current, lsd) = position_leverage(&pool, raw).unwrap();
        assert!((current - 3.0).abs() < 1e-9);
        assert!((lsd - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_dust_position_is_closed() {
        let pool = pool_info(PoolName::WstEth, 2);
        let raw = RawPosition { raw_colls: U256::from(4 * MIN_PRECISION), raw_debts: e18(1) };
        assert_eq!(position_leverage(&pool, raw).unwrap(), (0.0, 0.0));
    }

    #[test]
    fn test_blend_keeps_leverage_when_targets_match() {
        let pool = pool_info(PoolName::WstEth, 2);
        let blended = blend_leverage(&pool, e18(1), 3.0, 3.0, e18(3));
        assert!((blended - 3.0).abs() < 1e-9);

        // adding at 5x to a 3x position lands between the two
        let blended = blend_leverage(&pool, e18(1), 5.0, 3.0, e18(3));
        assert!(blended > 3.0 && blended < 5.0);
    }

    #[test]
    fn test_short_withdraw_amount() {
        let pool = pool_info(PoolName::WstEthShort, 2);
        // C = 6, D = 2, repay 1 at lsd 2: dr = 1·2 = 2, withdraw 6 − 2 − 1 = 3
        let withdraw = short_withdraw_amount(&pool, e18(6), e18(2), e18(1), 2.0).unwrap();
        assert_eq!(withdraw, e18(3));

        let err = short_withdraw_amount(&pool, e18(6), e18(2), e18(1), 0.0).unwrap_err();
        assert!(matches!(err, SdkError::CannotCloseOrRemove));
    }

    #[tokio::test]
    async fn test_new_position_info_makes_no_rpc() {
        let pool = pool_info(PoolName::WstEth, 2);
        let chain = Arc::new(crate::testing::MockChain::new());
        let aggregator = fx_route_aggregator(chain.clone());
        let info = Position::new(&aggregator, &pool, 0, USER).get_position_info().await.unwrap();
        assert_eq!(info.current_leverage, 0.0);
        assert_eq!(chain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_position_info_is_idempotent() {
        let state = PoolState { raw_colls: e18(3), raw_debts: e18(4), ..PoolState::default() };
        let aggregator = aggregator_for(&state, 0);
        let pool = pool_info(PoolName::WstEth, 2);
        let position = Position::new(&aggregator, &pool, 5, USER);

        let first = position.get_position_info().await.unwrap();
        let second = position.get_position_info().await.unwrap();
        assert_eq!(first, second);
        assert!((first.current_leverage - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_open_new_position_orders_txs_by_nonce() {
        let state = PoolState { price: 2, ..PoolState::default() };
        let aggregator = aggregator_for(&state, 12);
        let pool = pool_info(PoolName::WstEth, 2);

        let outcome = Position::new(&aggregator, &pool, 0, USER)
            .increase_position(WSTETH, e18(1), 3.0, 0.01, &[])
            .await
            .unwrap();

        assert_eq!(outcome.position_id, 0);
        let route = &outcome.routes[0];
        assert!(route.min_out.is_none());
        // allowance 0: token approval, no position approval for a new position, then the trade
        let kinds: Vec<_> = route.txs.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TxKind::ApproveToken, TxKind::Trade]);
        let nonces: Vec<_> = route.txs.iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![12, 13]);

        let trade = &route.txs[1];
        assert_eq!(trade.to, ROUTER_DIAMOND);
        assert_eq!(trade.value, U256::ZERO);
        tokio_test::assert_ok!(IPositionOperateFlashLoanFacetV2::openOrAddPositionFlashLoanV2Call::abi_decode(
            &trade.data
        ));
    }

    #[tokio::test]
    async fn test_eth_input_is_zapped_and_sent_as_value() {
        let state = PoolState { price: 2, ..PoolState::default() };
        let aggregator = aggregator_for(&state, 0);
        let pool = pool_info(PoolName::WstEth, 2);

        // 0.5 ETH zaps through weth into 1 wstETH at price 2
        let half = U256::from(500_000_000_000_000_000u64);
        let outcome = Position::new(&aggregator, &pool, 0, USER)
            .increase_position(ETH, half, 3.0, 0.01, &[])
            .await
            .unwrap();
        let route = &outcome.routes[0];
        assert_eq!(route.txs.len(), 1);
        assert_eq!(route.txs[0].kind, TxKind::Trade);
        assert_eq!(route.txs[0].value, half);
    }

    #[tokio::test]
    async fn test_full_close_needs_position_approval_only() {
        let state = PoolState { price: 2, raw_colls: e18(3), raw_debts: e18(4), ..PoolState::default() };
        let aggregator = aggregator_for(&state, 3);
        let pool = pool_info(PoolName::WstEth, 2);

        let outcome = Position::new(&aggregator, &pool, 5, USER)
            .reduce_position(WSTETH, U256::ZERO, 0.3, &[], true)
            .await
            .unwrap();
        let route = &outcome.routes[0];
        assert_eq!((route.colls, route.debts), (U256::ZERO, U256::ZERO));
        assert!(route.min_out.is_some());
        let kinds: Vec<_> = route.txs.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TxKind::ApprovePosition, TxKind::Trade]);
        assert_eq!(route.txs[1].nonce, 4);
    }

    #[tokio::test]
    async fn test_adjust_up_adds_without_new_funds() {
        let state = PoolState { price: 2, raw_colls: e18(3), raw_debts: e18(4), ..PoolState::default() };
        let aggregator = aggregator_for(&state, 0);
        let pool = pool_info(PoolName::WstEth, 2);

        let outcome = Position::new(&aggregator, &pool, 5, USER)
            .adjust_position_leverage(3.5, 0.01, &[])
            .await
            .unwrap();
        let route = &outcome.routes[0];
        assert!(route.debts > e18(4));
        let kinds: Vec<_> = route.txs.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TxKind::ApprovePosition, TxKind::Trade]);

        let call =
            IPositionOperateFlashLoanFacetV2::openOrAddPositionFlashLoanV2Call::abi_decode(&route.txs[1].data).unwrap();
        assert_eq!(call.params.amount, U256::ZERO);
        assert_eq!(call.positionId, U256::from(5u64));
    }

    #[tokio::test]
    async fn test_adjust_down_withdraws_proportional_collateral() {
        // C = 4, D = 6 at price 2: 4x. Down to 2x releases 4·(4 − 2)/4 = 2 collateral
        // and repays 6 − 2·2·0.5 = 4 fxUSD
        let state = PoolState { price: 2, raw_colls: e18(4), raw_debts: e18(6), ..PoolState::default() };
        let aggregator = aggregator_for(&state, 9);
        let pool = pool_info(PoolName::WstEth, 2);

        let outcome = Position::new(&aggregator, &pool, 5, USER)
            .adjust_position_leverage(2.0, 0.01, &[])
            .await
            .unwrap();
        let route = &outcome.routes[0];
        assert!(route.min_out.is_none());
        assert!(route.colls.abs_diff(e18(2)) < e16(1), "colls {}", route.colls);
        assert!(route.debts.abs_diff(e18(2)) < e16(1), "debts {}", route.debts);
        let kinds: Vec<_> = route.txs.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TxKind::ApprovePosition, TxKind::Trade]);
        assert_eq!(route.txs[1].nonce, 10);

        let call = IPositionOperateFlashLoanFacetV2::closeOrRemovePositionFlashLoanV2Call::abi_decode(&route.txs[1].data)
            .unwrap();
        assert_eq!(call.positionId, U256::from(5u64));
        assert_eq!(call.params.minOut, U256::ZERO);
        assert!(call.borrowAmount.abs_diff(e18(2)) < e16(1));
        let withdrawn = call.amountOut.into_raw();
        assert!(withdrawn > call.borrowAmount);
        assert!(withdrawn.abs_diff(e18(2)) < e16(1));

        let (_, repay, _, _) = <(U256, U256, Address, Bytes)>::abi_decode_params(&call.data).unwrap();
        assert!(repay.abs_diff(e18(4)) < e16(1));
    }

    #[tokio::test]
    async fn test_short_reduce_repays_debt_and_releases_collateral() {
        // 6 fxUSD against 2 wstETH at 2: lsd 2x. Repaying 1 wstETH releases 6 − 2 − 1 = 3 fxUSD
        let state = PoolState { price: 2, raw_colls: e18(6), raw_debts: e18(2), ..PoolState::default() };
        let aggregator = aggregator_on(PoolName::WstEthShort, &state, 0);
        let pool = short_pool();

        let outcome = Position::new(&aggregator, &pool, 3, USER)
            .reduce_position(FXUSD, e18(1), 0.01, &[], false)
            .await
            .unwrap();
        let route = &outcome.routes[0];
        assert!((route.leverage - 2.0).abs() < 1e-9);
        assert_eq!(route.colls, e18(3));
        assert!(route.debts.abs_diff(e18(1)) < e16(1), "debts {}", route.debts);
        // 3 released minus ~2 fxUSD spent buying back the wstETH
        let min_out = route.min_out.unwrap();
        assert!(min_out > e16(99) && min_out < e18(1), "min out {}", min_out);

        let call = IShortPositionOperateFlashLoanFacet::closeOrRemoveShortPositionFlashLoanCall::abi_decode(
            &route.txs.last().unwrap().data,
        )
        .unwrap();
        assert_eq!(call.amountOut, I256::try_from(e18(3)).unwrap());
        assert!(call.borrowAmount <= e18(1));
        assert!(call.borrowAmount.abs_diff(e18(1)) < e16(1));
        assert_eq!(call.params.tokenOut, FXUSD);
        assert_eq!(call.pool, pool.config.pool_address);
    }

    #[tokio::test]
    async fn test_short_open_from_fx_usd() {
        let state = PoolState { price: 2, ..PoolState::default() };
        let aggregator = aggregator_on(PoolName::WstEthShort, &state, 4);
        let pool = short_pool();

        // 2 fxUSD at 2x on the volatile asset: borrow and sell 2 wstETH
        let outcome = Position::new(&aggregator, &pool, 0, USER)
            .increase_position(FXUSD, e18(2), 2.0, 0.01, &[])
            .await
            .unwrap();
        let route = &outcome.routes[0];
        assert!((route.leverage - 2.0).abs() < 1e-9);
        assert_eq!(route.debts, e18(2));
        assert!(route.colls.abs_diff(e18(6)) < e16(1), "colls {}", route.colls);

        let kinds: Vec<_> = route.txs.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TxKind::ApproveToken, TxKind::Trade]);
        assert_eq!(route.txs[1].nonce, 5);
        assert_eq!(route.txs[0].to, FXUSD);

        let call =
            IShortPositionOperateFlashLoanFacet::openOrAddShortPositionFlashLoanCall::abi_decode(&route.txs[1].data)
                .unwrap();
        assert_eq!(call.borrowAmount, e18(2));
        assert_eq!(call.params.tokenIn, FXUSD);
        assert_eq!(call.params.amount, e18(2));
    }

    #[tokio::test]
    async fn test_deposit_and_mint() {
        let state = PoolState { price: 2, raw_colls: e18(3), raw_debts: e18(2), ..PoolState::default() };
        let aggregator = aggregator_for(&state, 0);
        let pool = pool_info(PoolName::WstEth, 2);

        let outcome = Position::new(&aggregator, &pool, 5, USER)
            .deposit_and_mint(WSTETH, e18(1), e18(2))
            .await
            .unwrap();
        assert_eq!(outcome.colls, e18(4));
        assert_eq!(outcome.debts, e18(4));
        // 4 collateral at 2 against 4 debt
        assert!((outcome.leverage - 2.0).abs() < 1e-9);
        assert_eq!(outcome.execution_price, U256::from(2u64));

        let trade = outcome.txs.last().unwrap();
        assert_eq!(trade.to, FX_MINT_ROUTER);
        let call = IPositionOperateFacet::borrowFromLongCall::abi_decode(&trade.data).unwrap();
        assert_eq!(call.params.minOut, U256::from(999_000_000_000_000_000u64));
        assert_eq!(call.borrowParams.borrowAmount, e18(2));
    }

    #[tokio::test]
    async fn test_repay_everything_closes() {
        let state = PoolState { price: 2, raw_colls: e18(3), raw_debts: e18(2), ..PoolState::default() };
        let aggregator = aggregator_for(&state, 0);
        let pool = pool_info(PoolName::WstEth, 2);

        let outcome = Position::new(&aggregator, &pool, 5, USER)
            .repay_and_withdraw(e18(5), e18(3), WSTETH)
            .await
            .unwrap();
        assert_eq!(outcome.debts, U256::ZERO);
        assert_eq!(outcome.colls, U256::ZERO);
        assert_eq!(outcome.leverage, 0.0);

        let kinds: Vec<_> = outcome.txs.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TxKind::ApproveToken, TxKind::ApprovePosition, TxKind::Trade]);
        let call = IPositionOperateFacet::repayToLongCall::abi_decode(&outcome.txs[2].data).unwrap();
        assert_eq!(call.params.minOut, e18(2) + CLOSE_EPSILON);
        assert_eq!(call.params.amount, e18(2) + CLOSE_EPSILON);
    }

    #[tokio::test]
    async fn test_partial_repay_with_zap_out() {
        let state = PoolState { price: 2, raw_colls: e18(3), raw_debts: e18(4), ..PoolState::default() };
        let aggregator = aggregator_for(&state, 0);
        let pool = pool_info(PoolName::WstEth, 2);

        let outcome = Position::new(&aggregator, &pool, 5, USER)
            .repay_and_withdraw(e18(1), e18(1), STETH)
            .await
            .unwrap();
        assert_eq!(outcome.debts, e18(3));
        assert_eq!(outcome.colls, e18(2));
        // 2 collateral at 2 against 3 debt
        assert!((outcome.leverage - 4.0).abs() < 1e-9);

        let call = IPositionOperateFacet::repayToLongAndZapOutCall::abi_decode(&outcome.txs.last().unwrap().data)
            .unwrap();
        assert_eq!(call.convertOut.tokenOut, STETH);
        assert!(!call.convertOut.routes.is_empty());
        assert_eq!(call.repayParams.withdrawAmount, e18(1));
    }

    #[tokio::test]
    async fn test_mint_router_rejects_short_pools() {
        let state = PoolState::default();
        let aggregator = aggregator_for(&state, 0);
        let pool = pool_info(PoolName::WstEthShort, 2);
        let err = Position::new(&aggregator, &pool, 1, USER)
            .deposit_and_mint(FXUSD, e18(1), e18(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Validation(_)));
    }
}

//! In-memory chain and quote providers for unit tests

use crate::aggregator::{
    Aggregator, FxRouteProvider, QuoteProvider, QuoteRequest, QuoteResult, RouteRequest, RouteResult, RouteType,
};
use crate::chain::{ChainClient, ContractCall};
use crate::contracts::{
    IERC20, IMultiPathConverter, IPool, IPoolConfiguration, IPoolManager, IPriceOracle, IRateProvider,
    MULTI_PATH_CONVERTER, POOL_CONFIGURATION, RATE_PROVIDER,
};
use crate::error::{Result, SdkError};
use crate::indexer::PositionIndex;
use crate::math::PRECISION;
use crate::pool::{OraclePrice, PoolData, PoolInfo, PoolName, PriceSet};
use crate::router::{resolve, RouterTable};
use crate::tokens::{ALL_TOKENS, FXUSD, USDC};
use alloy_primitives::{address, Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Handler = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Dispatches calls on (target, selector). Unhandled calls revert.
pub struct MockChain {
    handlers: HashMap<(Address, [u8; 4]), Handler>,
    nonce: u64,
    chain_id: u64,
    calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            nonce: 0,
            chain_id: 1,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Answer calls of type `C` on `target`. Returning `None` reverts.
    pub fn on<C, F>(mut self, target: Address, handler: F) -> Self
    where
        C: SolCall + 'static,
        F: Fn(C) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.handlers.insert(
            (target, C::SELECTOR),
            Box::new(move |data| C::abi_decode(data).ok().and_then(|call| handler(call))),
        );
        self
    }

    pub fn with_converter<F>(self, handler: F) -> Self
    where
        F: Fn(IMultiPathConverter::queryConvertCall) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.on::<IMultiPathConverter::queryConvertCall, _>(MULTI_PATH_CONVERTER, handler)
    }

    /// Number of `call` / `batch_call` round trips made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn dispatch(&self, target: Address, data: &[u8]) -> Option<Vec<u8>> {
        let selector: [u8; 4] = data.get(..4)?.try_into().ok()?;
        self.handlers.get(&(target, selector)).and_then(|h| h(data))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, target: Address, data: Bytes) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dispatch(target, &data)
            .map(Bytes::from)
            .ok_or_else(|| SdkError::Rpc(format!("execution reverted at {}", target)))
    }

    async fn batch_call(&self, calls: &[ContractCall]) -> Result<Vec<Option<Bytes>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(calls
            .iter()
            .map(|c| self.dispatch(c.target, &c.data).map(Bytes::from))
            .collect())
    }

    async fn get_nonce(&self, _address: Address) -> Result<u64> {
        Ok(self.nonce)
    }
}

/// Converter pricing the volatile asset at `price` fxUSD, for 18-decimal tokens.
///
/// Paths leaving fxUSD divide by the price, every other path multiplies.
pub fn linear_converter(
    price: u64,
) -> impl Fn(IMultiPathConverter::queryConvertCall) -> Option<Vec<u8>> + Send + Sync + 'static {
    let fx_usd_hop = resolve(FXUSD, USDC, RouterTable::Legacy)
        .map(|c| c.routes[0])
        .unwrap_or_default();
    move |call| {
        let price = U256::from(price);
        let out = match call.routes.first() {
            None => call.amountIn,
            Some(hop) if *hop == fx_usd_hop => call.amountIn / price,
            Some(_) => call.amountIn * price,
        };
        Some(out.abi_encode())
    }
}

// ============================================
// QUOTE PROVIDERS
// ============================================

pub const STATIC_ROUTE_TARGET: Address = address!("2222222222222222222222222222222222222222");

/// Provider whose output is a pure function of the input amount
pub struct StaticProvider {
    route_type: RouteType,
    output: Box<dyn Fn(U256) -> Option<U256> + Send + Sync>,
}

impl StaticProvider {
    /// Always returns `dst`
    pub fn new(route_type: RouteType, dst: U256) -> Self {
        Self { route_type, output: Box::new(move |_| Some(dst)) }
    }

    /// Returns `amount * numerator / denominator`
    pub fn proportional(route_type: RouteType, numerator: u64, denominator: u64) -> Self {
        Self {
            route_type,
            output: Box::new(move |amount| Some(amount * U256::from(numerator) / U256::from(denominator))),
        }
    }

    pub fn failing(route_type: RouteType) -> Self {
        Self { route_type, output: Box::new(|_| None) }
    }

    fn output(&self, amount: U256) -> Result<U256> {
        (self.output)(amount).ok_or_else(|| SdkError::provider(self.route_type, "unavailable"))
    }
}

#[async_trait]
impl QuoteProvider for StaticProvider {
    fn route_type(&self) -> RouteType {
        self.route_type
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResult> {
        Ok(QuoteResult {
            route_type: self.route_type,
            src: request.amount,
            dst: self.output(request.amount)?,
            convert_data: None,
        })
    }

    async fn get_route(&self, request: &RouteRequest) -> Result<RouteResult> {
        Ok(RouteResult {
            route_type: self.route_type,
            src: request.amount,
            dst: self.output(request.amount)?,
            to: STATIC_ROUTE_TARGET,
            data: Bytes::from(vec![0xab; 4]),
        })
    }
}

// ============================================
// POOL FIXTURES
// ============================================

pub const USER: Address = address!("1111111111111111111111111111111111111111");

fn e16(units: u64) -> U256 {
    U256::from(units) * U256::from(10_000_000_000_000_000u64)
}

/// On-chain state behind `pool_chain`
#[derive(Debug, Clone)]
pub struct PoolState {
    /// Converter price, fxUSD per unit
    pub price: u64,
    pub collateral_capacity: U256,
    pub collateral_balance: U256,
    pub debt_capacity: U256,
    pub debt_balance: U256,
    pub min_debt_ratio: U256,
    pub max_debt_ratio: U256,
    pub open_fee: U256,
    pub close_fee: U256,
    pub repay_fee: U256,
    pub anchor_price: U256,
    pub rate: U256,
    pub raw_colls: U256,
    pub raw_debts: U256,
    pub owner: Address,
    pub approved: Address,
    pub allowance: U256,
}

impl Default for PoolState {
    fn default() -> Self {
        let capacity = U256::from(1_000_000_000u64) * PRECISION;
        Self {
            price: 2000,
            collateral_capacity: capacity,
            collateral_balance: U256::ZERO,
            debt_capacity: capacity,
            debt_balance: U256::ZERO,
            min_debt_ratio: e16(50),
            max_debt_ratio: e16(80),
            open_fee: U256::ZERO,
            close_fee: U256::ZERO,
            repay_fee: U256::ZERO,
            anchor_price: U256::from(2000u64) * PRECISION,
            rate: PRECISION,
            raw_colls: U256::ZERO,
            raw_debts: U256::ZERO,
            owner: USER,
            approved: Address::ZERO,
            allowance: U256::ZERO,
        }
    }
}

/// Chain answering every read the pool, position and approval paths make.
pub fn pool_chain(name: PoolName, state: &PoolState) -> MockChain {
    let config = name.config();
    let s = state.clone();

    let info = (
        s.collateral_capacity,
        s.collateral_balance,
        s.collateral_balance,
        s.debt_capacity,
        s.debt_balance,
    );
    let range = (s.min_debt_ratio, s.max_debt_ratio);
    let fees = (s.open_fee, s.close_fee, U256::ZERO, s.repay_fee);
    let anchor = s.anchor_price;
    let position = (s.raw_colls, s.raw_debts);
    let (rate, owner, approved, allowance) = (s.rate, s.owner, s.approved, s.allowance);

    let mut chain = MockChain::new()
        .with_converter(linear_converter(s.price))
        .on::<IPoolManager::getPoolInfoCall, _>(config.pool_manager(), move |_| Some(info.abi_encode_params()))
        .on::<IPoolManager::pausedCall, _>(config.pool_manager(), |_| Some(false.abi_encode()))
        .on::<IPool::getDebtRatioRangeCall, _>(config.pool_address, move |_| Some(range.abi_encode_params()))
        .on::<IPoolConfiguration::getPoolFeeRatioCall, _>(POOL_CONFIGURATION, move |_| Some(fees.abi_encode_params()))
        .on::<IPriceOracle::getPriceCall, _>(config.oracle, move |_| Some((anchor, anchor, anchor).abi_encode_params()))
        .on::<IRateProvider::getRateCall, _>(RATE_PROVIDER, move |_| Some(rate.abi_encode()))
        .on::<IPool::getPositionCall, _>(config.pool_address, move |_| Some(position.abi_encode_params()))
        .on::<IPool::ownerOfCall, _>(config.pool_address, move |_| Some(owner.abi_encode()))
        .on::<IPool::getApprovedCall, _>(config.pool_address, move |_| Some(approved.abi_encode()));

    for token in ALL_TOKENS.iter().filter(|t| !t.address.is_zero()) {
        chain = chain.on::<IERC20::allowanceCall, _>(token.address, move |_| Some(allowance.abi_encode()));
    }
    chain
}

/// Aggregator with only the on-chain converter providers
pub fn fx_route_aggregator(chain: Arc<dyn ChainClient>) -> Aggregator {
    Aggregator::with_providers(
        chain.clone(),
        vec![
            Arc::new(FxRouteProvider::new(chain.clone(), RouterTable::Legacy)),
            Arc::new(FxRouteProvider::new(chain, RouterTable::V3)),
        ],
    )
}

/// Snapshot priced at `price` everywhere, debt-ratio bounds [0.5, 0.8], no fees.
pub fn pool_info(name: PoolName, price: u64) -> PoolInfo {
    let config = name.config();
    let state = PoolState::default();
    let wad_price = U256::from(price) * PRECISION;
    PoolInfo {
        config,
        data: PoolData {
            collateral_capacity: state.collateral_capacity,
            collateral_balance: U256::ZERO,
            raw_collateral: U256::ZERO,
            debt_capacity: state.debt_capacity,
            debt_balance: U256::ZERO,
            is_paused: false,
            min_debt_ratio: state.min_debt_ratio,
            max_debt_ratio: state.max_debt_ratio,
            supply_fee_ratio: U256::ZERO,
            withdraw_fee_ratio: U256::ZERO,
            repay_fee_ratio: U256::ZERO,
        },
        oracle: OraclePrice { anchor: wad_price, min: wad_price, max: wad_price },
        rate: PRECISION,
        prices: PriceSet::new(wad_price, wad_price, config.is_short),
    }
}

// ============================================
// POSITION INDEX
// ============================================

/// Index returning the same ids for every pool and owner
pub struct StaticPositionIndex {
    ids: Vec<u64>,
}

impl StaticPositionIndex {
    pub fn new(ids: Vec<u64>) -> Self {
        Self { ids }
    }
}

#[async_trait]
impl PositionIndex for StaticPositionIndex {
    async fn positions_of(&self, _pool: Address, _owner: Address) -> Result<Vec<u64>> {
        Ok(self.ids.clone())
    }
}

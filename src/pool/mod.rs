//! Pool/Price Model
//!
//! Static configuration for the four margin pools plus the per-request
//! snapshot (`PoolInfo`) every position operation starts from. Snapshots
//! are read fresh each time and never cached.

pub mod price;

pub use price::PriceSet;

use crate::aggregator::Aggregator;
use crate::chain::{self, decode_entry, ChainClient, ContractCall};
use crate::contracts::{
    IPool, IPoolConfiguration, IPoolManager, IPriceOracle, IRateProvider, FX_MINT_ROUTER,
    INVERSE_WBTC_PRICE_ORACLE, INVERSE_WSTETH_PRICE_ORACLE, POOL_CONFIGURATION, POOL_MANAGER,
    RATE_PROVIDER, ROUTER_DIAMOND, SHORT_POOL_MANAGER, STETH_PRICE_ORACLE, WBTC_LONG_POOL,
    WBTC_PRICE_ORACLE, WBTC_SHORT_POOL, WSTETH_LONG_POOL, WSTETH_SHORT_POOL,
};
use crate::error::{Result, SdkError};
use crate::math::{pow10, PRECISION};
use crate::tokens::{FXUSD, WBTC, WSTETH};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

// ============================================
// MARKET / SIDE
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Eth,
    Btc,
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Market::Eth => write!(f, "ETH"),
            Market::Btc => write!(f, "BTC"),
        }
    }
}

impl FromStr for Market {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ETH" => Ok(Market::Eth),
            "BTC" => Ok(Market::Btc),
            _ => Err(SdkError::validation("Market must be ETH or BTC")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Long,
    Short,
}

impl PositionType {
    /// Product name used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            PositionType::Long => "xPOSITION",
            PositionType::Short => "sPOSITION",
        }
    }
}

impl std::fmt::Display for PositionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionType::Long => write!(f, "long"),
            PositionType::Short => write!(f, "short"),
        }
    }
}

impl FromStr for PositionType {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "long" => Ok(PositionType::Long),
            "short" => Ok(PositionType::Short),
            _ => Err(SdkError::validation("Type must be long or short")),
        }
    }
}

// ============================================
// POOL CONFIG
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolName {
    #[serde(rename = "wstETH")]
    WstEth,
    #[serde(rename = "WBTC")]
    Wbtc,
    #[serde(rename = "wstETH_short")]
    WstEthShort,
    #[serde(rename = "WBTC_short")]
    WbtcShort,
}

impl PoolName {
    pub const ALL: [PoolName; 4] = [
        PoolName::WstEth,
        PoolName::Wbtc,
        PoolName::WstEthShort,
        PoolName::WbtcShort,
    ];

    pub fn resolve(market: Market, position_type: PositionType) -> Self {
        match (market, position_type) {
            (Market::Eth, PositionType::Long) => PoolName::WstEth,
            (Market::Btc, PositionType::Long) => PoolName::Wbtc,
            (Market::Eth, PositionType::Short) => PoolName::WstEthShort,
            (Market::Btc, PositionType::Short) => PoolName::WbtcShort,
        }
    }

    pub fn config(&self) -> PoolConfig {
        let dust = U256::from(MIN_PRECISION);
        match self {
            PoolName::WstEth => PoolConfig {
                name: *self,
                is_short: false,
                coll_token: WSTETH,
                coll_symbol: "wstETH",
                debt_token: FXUSD,
                debt_symbol: "fxUSD",
                pool_address: WSTETH_LONG_POOL,
                oracle: STETH_PRICE_ORACLE,
                decimals: 18,
                precision: PRECISION,
                min_precision: dust,
            },
            PoolName::Wbtc => PoolConfig {
                name: *self,
                is_short: false,
                coll_token: WBTC,
                coll_symbol: "WBTC",
                debt_token: FXUSD,
                debt_symbol: "fxUSD",
                pool_address: WBTC_LONG_POOL,
                oracle: WBTC_PRICE_ORACLE,
                decimals: 8,
                precision: pow10(8),
                min_precision: dust,
            },
            PoolName::WstEthShort => PoolConfig {
                name: *self,
                is_short: true,
                coll_token: FXUSD,
                coll_symbol: "fxUSD",
                debt_token: WSTETH,
                debt_symbol: "wstETH",
                pool_address: WSTETH_SHORT_POOL,
                oracle: INVERSE_WSTETH_PRICE_ORACLE,
                decimals: 18,
                precision: PRECISION,
                min_precision: dust,
            },
            PoolName::WbtcShort => PoolConfig {
                name: *self,
                is_short: true,
                coll_token: FXUSD,
                coll_symbol: "fxUSD",
                debt_token: WBTC,
                debt_symbol: "WBTC",
                pool_address: WBTC_SHORT_POOL,
                oracle: INVERSE_WBTC_PRICE_ORACLE,
                decimals: 8,
                precision: pow10(8),
                min_precision: dust,
            },
        }
    }
}

impl std::fmt::Display for PoolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolName::WstEth => write!(f, "wstETH"),
            PoolName::Wbtc => write!(f, "WBTC"),
            PoolName::WstEthShort => write!(f, "wstETH_short"),
            PoolName::WbtcShort => write!(f, "WBTC_short"),
        }
    }
}

/// Dust unit of every pool; positions under five units count as closed
pub const MIN_PRECISION: u64 = 10_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolConfig {
    pub name: PoolName,
    pub is_short: bool,
    pub coll_token: Address,
    pub coll_symbol: &'static str,
    pub debt_token: Address,
    pub debt_symbol: &'static str,
    pub pool_address: Address,
    pub oracle: Address,
    /// Decimals of the volatile asset
    pub decimals: u8,
    /// `10^decimals`
    pub precision: U256,
    pub min_precision: U256,
}

impl PoolConfig {
    pub fn position_type(&self) -> PositionType {
        if self.is_short { PositionType::Short } else { PositionType::Long }
    }

    /// Product name used in user-facing messages
    pub fn label(&self) -> &'static str {
        self.position_type().label()
    }

    /// Asset whose price the position tracks: collateral for longs, debt for shorts
    pub fn volatile_token(&self) -> Address {
        if self.is_short { self.debt_token } else { self.coll_token }
    }

    pub fn volatile_symbol(&self) -> &'static str {
        if self.is_short { self.debt_symbol } else { self.coll_symbol }
    }

    pub fn pool_manager(&self) -> Address {
        if self.is_short { SHORT_POOL_MANAGER } else { POOL_MANAGER }
    }

    /// wstETH pools account in stETH terms through the rate provider
    pub fn uses_rate(&self) -> bool {
        self.volatile_token() == WSTETH
    }
}

// ============================================
// POOL SNAPSHOT
// ============================================

#[derive(Debug, Clone, Serialize)]
pub struct PoolData {
    pub collateral_capacity: U256,
    pub collateral_balance: U256,
    pub raw_collateral: U256,
    pub debt_capacity: U256,
    pub debt_balance: U256,
    pub is_paused: bool,
    pub min_debt_ratio: U256,
    pub max_debt_ratio: U256,
    /// Open fee charged through the flash-loan router
    pub supply_fee_ratio: U256,
    /// Close fee charged through the flash-loan router
    pub withdraw_fee_ratio: U256,
    /// Repay fee charged through the mint router
    pub repay_fee_ratio: U256,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OraclePrice {
    pub anchor: U256,
    pub min: U256,
    pub max: U256,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolInfo {
    pub config: PoolConfig,
    pub data: PoolData,
    pub oracle: OraclePrice,
    /// Exchange rate of the volatile asset, 1e18 unless it is wstETH
    pub rate: U256,
    pub prices: PriceSet,
}

impl PoolInfo {
    /// Remaining collateral capacity, `None` once exhausted
    pub fn coll_rest(&self) -> Option<U256> {
        self.data.collateral_capacity.checked_sub(self.data.collateral_balance)
    }

    /// Remaining debt capacity, `None` once exhausted
    pub fn debt_rest(&self) -> Option<U256> {
        self.data.debt_capacity.checked_sub(self.data.debt_balance)
    }

    pub fn open_fee(&self) -> U256 {
        self.data.supply_fee_ratio
    }

    pub fn close_fee(&self) -> U256 {
        self.data.withdraw_fee_ratio
    }

    pub fn repay_fee(&self) -> U256 {
        self.data.repay_fee_ratio
    }
}

// ============================================
// READS
// ============================================

/// Capacity, pause flag, debt-ratio range and fees in one batched read.
pub async fn fetch_pool_data(chain: &dyn ChainClient, config: &PoolConfig) -> Result<PoolData> {
    let manager = config.pool_manager();
    let pool = config.pool_address;

    let calls = vec![
        ContractCall::new(manager, &IPoolManager::getPoolInfoCall { pool }),
        ContractCall::new(manager, &IPoolManager::pausedCall {}),
        ContractCall::new(pool, &IPool::getDebtRatioRangeCall {}),
        ContractCall::new(
            POOL_CONFIGURATION,
            &IPoolConfiguration::getPoolFeeRatioCall { pool, recipient: ROUTER_DIAMOND },
        ),
        ContractCall::new(
            POOL_CONFIGURATION,
            &IPoolConfiguration::getPoolFeeRatioCall { pool, recipient: FX_MINT_ROUTER },
        ),
    ];
    let results = chain.batch_call(&calls).await?;

    let info = decode_entry::<IPoolManager::getPoolInfoCall>(results.first()).ok_or(SdkError::PoolInfo)?;
    let is_paused = decode_entry::<IPoolManager::pausedCall>(results.get(1)).ok_or(SdkError::PoolInfo)?;
    let range = decode_entry::<IPool::getDebtRatioRangeCall>(results.get(2)).ok_or(SdkError::PoolInfo)?;
    let router_fees =
        decode_entry::<IPoolConfiguration::getPoolFeeRatioCall>(results.get(3)).ok_or(SdkError::PoolInfo)?;
    let mint_fees =
        decode_entry::<IPoolConfiguration::getPoolFeeRatioCall>(results.get(4)).ok_or(SdkError::PoolInfo)?;

    Ok(PoolData {
        collateral_capacity: info.collateralCapacity,
        collateral_balance: info.collateralBalance,
        raw_collateral: info.rawCollateral,
        debt_capacity: info.debtCapacity,
        debt_balance: info.debtBalance,
        is_paused,
        min_debt_ratio: range.minDebtRatio,
        max_debt_ratio: range.maxDebtRatio,
        supply_fee_ratio: router_fees.supplyRatio,
        withdraw_fee_ratio: router_fees.withdrawRatio,
        repay_fee_ratio: mint_fees.repayRatio,
    })
}

pub async fn fetch_rate(chain: &dyn ChainClient, config: &PoolConfig) -> Result<U256> {
    if !config.uses_rate() {
        return Ok(PRECISION);
    }
    chain::read(chain, RATE_PROVIDER, IRateProvider::getRateCall {}).await
}

pub async fn fetch_oracle_price(chain: &dyn ChainClient, config: &PoolConfig) -> Result<OraclePrice> {
    let price = chain::read(chain, config.oracle, IPriceOracle::getPriceCall {}).await?;
    Ok(OraclePrice {
        anchor: price.anchorPrice,
        min: price.minPrice,
        max: price.maxPrice,
    })
}

/// Full snapshot: pool state, rate, oracle and synthesised prices.
pub async fn get_pool_info(chain: &dyn ChainClient, aggregator: &Aggregator, name: PoolName) -> Result<PoolInfo> {
    let config = name.config();
    let (data, rate, oracle) = tokio::try_join!(
        fetch_pool_data(chain, &config),
        fetch_rate(chain, &config),
        fetch_oracle_price(chain, &config),
    )?;
    let prices = price::fetch_prices(aggregator, &config, rate).await?;

    info!(
        "📊 Pool {}: avg price {}, debt ratio [{}, {}], paused {}",
        name, prices.average, data.min_debt_ratio, data.max_debt_ratio, data.is_paused
    );

    Ok(PoolInfo { config, data, oracle, rate, prices })
}

//! Synthetic pool prices
//!
//! Buy and sell prices come from FxRoute-only probes against the on-chain
//! converter so that displayed base prices stay deterministic. All prices
//! are 1e18 fixed point, USD per unit of the underlying asset.

use super::PoolConfig;
use crate::aggregator::{Aggregator, QuoteRequest, RouteType};
use crate::error::{Result, SdkError};
use crate::math::{mul_div, PRECISION};
use crate::tokens::{FXUSD, WBTC, WETH, WSTETH};
use alloy_primitives::{uint, Address, U256};
use serde::Serialize;
use tracing::debug;

/// 100 fxUSD
pub const BUY_PROBE_AMOUNT: U256 = uint!(100000000000000000000_U256);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriceSet {
    pub buy: U256,
    pub sell: U256,
    pub average: U256,
    pub open: U256,
    pub close: U256,
}

impl PriceSet {
    /// Shorts enter at the sell side and exit at the buy side.
    pub fn new(buy: U256, sell: U256, is_short: bool) -> Self {
        let average = (buy + sell) / U256::from(2u64);
        let (open, close) = if is_short { (sell, buy) } else { (buy, sell) };
        Self { buy, sell, average, open, close }
    }
}

/// Probe size for the sell side, per volatile asset
pub fn sell_probe_amount(token: Address) -> Option<U256> {
    match token {
        t if t == WSTETH || t == WETH => Some(U256::from(10_000_000_000_000_000u64)),
        t if t == WBTC => Some(U256::from(10_000u64)),
        _ => None,
    }
}

async fn probe(aggregator: &Aggregator, config: &PoolConfig, src: Address, dst: Address, amount: U256) -> Result<U256> {
    let selection = aggregator
        .quote(&QuoteRequest { src, dst, amount }, &[RouteType::FxRoute])
        .await
        .map_err(|_| SdkError::PriceNotFound(config.name.to_string()))?;
    let out = selection
        .best_result()
        .map(|q| q.dst)
        .filter(|dst| !dst.is_zero())
        .ok_or_else(|| SdkError::PriceNotFound(config.name.to_string()))?;
    Ok(out)
}

/// `1e20 · precision · 1e18 / (dst · rate)`
pub async fn buy_price(aggregator: &Aggregator, config: &PoolConfig, rate: U256) -> Result<U256> {
    let dst = probe(aggregator, config, FXUSD, config.volatile_token(), BUY_PROBE_AMOUNT).await?;
    let denominator = dst.checked_mul(rate).ok_or(SdkError::Overflow("buy price"))?;
    mul_div(BUY_PROBE_AMOUNT * config.precision, PRECISION, denominator)
}

/// `dst · precision · 1e18 / (amount · rate)`
pub async fn sell_price(aggregator: &Aggregator, config: &PoolConfig, rate: U256) -> Result<U256> {
    let token = config.volatile_token();
    let amount = sell_probe_amount(token).ok_or_else(|| SdkError::PriceNotFound(config.name.to_string()))?;
    let dst = probe(aggregator, config, token, FXUSD, amount).await?;
    let numerator = dst.checked_mul(config.precision).ok_or(SdkError::Overflow("sell price"))?;
    mul_div(numerator, PRECISION, amount * rate)
}

pub async fn fetch_prices(aggregator: &Aggregator, config: &PoolConfig, rate: U256) -> Result<PriceSet> {
    let (buy, sell) = tokio::try_join!(
        buy_price(aggregator, config, rate),
        sell_price(aggregator, config, rate),
    )?;
    debug!("{} prices: buy {} sell {}", config.name, buy, sell);
    Ok(PriceSet::new(buy, sell, config.is_short))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainClient;
    use crate::pool::PoolName;
    use crate::testing::{fx_route_aggregator, linear_converter, MockChain};
    use std::sync::Arc;

    #[test]
    fn test_open_and_close_sides() {
        let buy = U256::from(2010u64);
        let sell = U256::from(1990u64);

        let long = PriceSet::new(buy, sell, false);
        assert_eq!(long.average, U256::from(2000u64));
        assert_eq!((long.open, long.close), (buy, sell));

        let short = PriceSet::new(buy, sell, true);
        assert_eq!((short.open, short.close), (sell, buy));
    }

    #[test]
    fn test_probe_amounts() {
        assert_eq!(sell_probe_amount(WBTC), Some(U256::from(10_000u64)));
        assert_eq!(sell_probe_amount(WETH), sell_probe_amount(WSTETH));
        assert!(sell_probe_amount(FXUSD).is_none());
    }

    #[tokio::test]
    async fn test_prices_from_linear_converter() {
        let chain: Arc<dyn ChainClient> = Arc::new(MockChain::new().with_converter(linear_converter(2000)));
        let aggregator = fx_route_aggregator(chain);
        let config = PoolName::WstEth.config();

        let prices = fetch_prices(&aggregator, &config, PRECISION).await.unwrap();
        assert_eq!(prices.buy, U256::from(2000u64) * PRECISION);
        assert_eq!(prices.sell, U256::from(2000u64) * PRECISION);

        // a 1.25 exchange rate scales both sides down
        let rate = U256::from(1_250_000_000_000_000_000u64);
        let buy = buy_price(&aggregator, &config, rate).await.unwrap();
        assert_eq!(buy, U256::from(1600u64) * PRECISION);
    }

    #[tokio::test]
    async fn test_failed_probe_is_price_not_found() {
        let chain: Arc<dyn ChainClient> = Arc::new(MockChain::new());
        let aggregator = fx_route_aggregator(chain);
        let err = fetch_prices(&aggregator, &PoolName::WstEthShort.config(), PRECISION)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Price not found for wstETH_short");
    }
}

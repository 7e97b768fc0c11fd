//! Binary amount search
//!
//! Inverts the on-chain converter: finds the smallest input whose
//! `queryConvert` output reaches a target. Each round probes 100 evenly
//! spaced amounts in one batched read and narrows the bracket to the step
//! where the target is first reached.

use crate::chain::{decode_entry, ChainClient, ContractCall};
use crate::contracts::IMultiPathConverter;
use crate::error::{Result, SdkError};
use crate::router::ConvertData;
use alloy_primitives::{Address, U256};
use std::time::{Duration, Instant};
use tracing::debug;

pub const SEARCH_STEPS: u64 = 100;
pub const MAX_SEARCH_ROUNDS: u32 = 10;

/// Bracket width at which an fxUSD-denominated search stops (0.01 fxUSD)
pub const FX_USD_SEARCH_FLOOR: U256 = U256::from_limbs([10_000_000_000_000_000, 0, 0, 0]);

/// Collateral-denominated searches stop at `precision / 100000`
pub const COLLATERAL_FLOOR_DIVISOR: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub amount: U256,
    pub rounds: u32,
    pub elapsed: Duration,
}

/// Search `[left, right]` for the input that converts to at least `expect`.
///
/// Returns the lower edge of the final bracket. A read that fails counts as
/// not reaching the target. A round in which no amount reaches the target
/// keeps the bracket and searches it again, until the round limit.
pub async fn search_amount(
    chain: &dyn ChainClient,
    converter: Address,
    convert: &ConvertData,
    mut left: U256,
    mut right: U256,
    expect: U256,
    precision: U256,
) -> Result<SearchOutcome> {
    let start = Instant::now();
    let steps = U256::from(SEARCH_STEPS);
    let mut rounds = 0u32;

    while left.saturating_add(precision) < right {
        if rounds == MAX_SEARCH_ROUNDS {
            return Err(SdkError::ExceedsTradingRange);
        }
        rounds += 1;

        let step = (right - left) / steps;
        if step.is_zero() {
            break;
        }

        let calls: Vec<ContractCall> = (1..=SEARCH_STEPS)
            .map(|i| {
                ContractCall::new(
                    converter,
                    &IMultiPathConverter::queryConvertCall {
                        amountIn: left + step * U256::from(i),
                        encoding: convert.encoding,
                        routes: convert.routes.clone(),
                    },
                )
            })
            .collect();

        let outputs = chain.batch_call(&calls).await?;
        let hit = (0..outputs.len()).find(|&i| {
            decode_entry::<IMultiPathConverter::queryConvertCall>(outputs.get(i))
                .is_some_and(|out| out >= expect)
        });

        match hit {
            Some(i) => {
                left += step * U256::from(i);
                right = left + step;
                debug!("Search round {}: bracket [{}, {}]", rounds, left, right);
            }
            None => debug!("Search round {}: target not reached in [{}, {}]", rounds, left, right),
        }
    }

    Ok(SearchOutcome { amount: left, rounds, elapsed: start.elapsed() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::MULTI_PATH_CONVERTER;
    use crate::math::PRECISION;
    use crate::router::{resolve, RouterTable};
    use crate::testing::{linear_converter, MockChain};
    use crate::tokens::{FXUSD, WSTETH};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn e18(units: u64) -> U256 {
        U256::from(units) * PRECISION
    }

    #[tokio::test]
    async fn test_converges_on_monotone_function() {
        // fxUSD -> wstETH at 2 fxUSD per wstETH, looking for 2 wstETH out
        let chain = MockChain::new().with_converter(linear_converter(2));
        let convert = resolve(FXUSD, WSTETH, RouterTable::Legacy).unwrap();

        let found = search_amount(
            &chain,
            MULTI_PATH_CONVERTER,
            &convert,
            e18(2),
            e18(8),
            e18(2),
            FX_USD_SEARCH_FLOOR,
        )
        .await
        .unwrap();

        // [2, 8] -> [3.98, 4.04] -> [3.9998, 4.0004]
        assert_eq!(found.rounds, 2);
        assert_eq!(found.amount, U256::from(3_999_800_000_000_000_000u64));
        assert!(found.amount <= e18(4));
        assert!(e18(4) - found.amount <= FX_USD_SEARCH_FLOOR);
    }

    #[tokio::test]
    async fn test_unreachable_target_exceeds_range() {
        let chain = MockChain::new().with_converter(linear_converter(2));
        let convert = resolve(FXUSD, WSTETH, RouterTable::Legacy).unwrap();

        let err = search_amount(
            &chain,
            MULTI_PATH_CONVERTER,
            &convert,
            e18(1),
            e18(4),
            e18(100),
            FX_USD_SEARCH_FLOOR,
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Exceeds the maximum trading range. Please lower the position size."
        );
        assert_eq!(chain.call_count(), MAX_SEARCH_ROUNDS as usize);
    }

    #[tokio::test]
    async fn test_failed_round_keeps_bracket() {
        // The first round's reads all revert, later rounds price at 2
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let price = linear_converter(2);
        let chain = MockChain::new().with_converter(move |call| {
            if counter.fetch_add(1, Ordering::SeqCst) < SEARCH_STEPS as usize {
                None
            } else {
                price(call)
            }
        });
        let convert = resolve(FXUSD, WSTETH, RouterTable::Legacy).unwrap();

        let found = search_amount(
            &chain,
            MULTI_PATH_CONVERTER,
            &convert,
            e18(2),
            e18(8),
            e18(2),
            FX_USD_SEARCH_FLOOR,
        )
        .await
        .unwrap();

        assert_eq!(found.rounds, 3);
        assert_eq!(found.amount, U256::from(3_999_800_000_000_000_000u64));
        assert_eq!(chain.call_count(), 3);
    }

    #[tokio::test]
    async fn test_narrow_bracket_returns_left_without_reads() {
        let chain = MockChain::new();
        let found = search_amount(
            &chain,
            MULTI_PATH_CONVERTER,
            &ConvertData::empty(),
            e18(1),
            e18(1) + U256::from(10u64),
            e18(1),
            FX_USD_SEARCH_FLOOR,
        )
        .await
        .unwrap();
        assert_eq!(found.rounds, 0);
        assert_eq!(found.amount, e18(1));
        assert_eq!(chain.call_count(), 0);
    }
}

//! Facade
//!
//! `FxSdk` is the public entry point. Each operation validates its request,
//! reads a fresh pool snapshot, checks position ownership and hands off to
//! the position orchestrator.

use crate::aggregator::Aggregator;
use crate::chain::{self, ChainClient, ClientRegistry};
use crate::config::SdkConfig;
use crate::contracts::IPool;
use crate::error::{Result, SdkError};
use crate::indexer::{HttpPositionIndex, NoPositionIndex, PositionIndex};
use crate::pool::{get_pool_info, Market, PoolInfo, PoolName, PositionType};
use crate::position::{Position, PositionInfo};
use crate::tokens::{parse_token, ETH, FXUSD, STETH, USDC, USDT, WBTC, WETH, WSTETH};
use crate::types::{
    AdjustLeverageRequest, DepositAndMintRequest, IncreasePositionRequest, MintOutcome, ReducePositionRequest,
    RepayAndWithdrawRequest, RouteOutcome,
};
use alloy_primitives::{Address, U256};
use futures::future::join_all;
use lazy_static::lazy_static;
use std::sync::Arc;
use tracing::info;

lazy_static! {
    static ref CLIENTS: ClientRegistry = ClientRegistry::new();
}

pub struct FxSdk {
    chain: Arc<dyn ChainClient>,
    aggregator: Aggregator,
    index: Arc<dyn PositionIndex>,
}

impl FxSdk {
    /// Connect with the production providers. RPC clients are shared per endpoint.
    pub async fn new(config: &SdkConfig) -> Result<Self> {
        let chain: Arc<dyn ChainClient> = CLIENTS.get_or_connect(config).await?;
        let aggregator = Aggregator::new(chain.clone(), config)?;
        let index: Arc<dyn PositionIndex> = match config.position_index_url {
            Some(_) => Arc::new(HttpPositionIndex::from_config(config)?),
            None => Arc::new(NoPositionIndex),
        };
        Ok(Self::with_components(chain, aggregator, index))
    }

    pub fn with_components(chain: Arc<dyn ChainClient>, aggregator: Aggregator, index: Arc<dyn PositionIndex>) -> Self {
        Self { chain, aggregator, index }
    }

    // ============================================
    // READS
    // ============================================

    pub async fn get_pool_info(&self, market: Market, position_type: PositionType) -> Result<PoolInfo> {
        get_pool_info(self.chain.as_ref(), &self.aggregator, PoolName::resolve(market, position_type)).await
    }

    pub async fn get_positions(
        &self,
        market: Market,
        position_type: PositionType,
        user: Address,
    ) -> Result<Vec<PositionInfo>> {
        validate_user(user)?;
        let name = PoolName::resolve(market, position_type);
        let ids = self.index.positions_of(name.config().pool_address, user).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.get_pool_info(market, position_type).await?;
        let pool = &pool;
        let infos = join_all(ids.into_iter().map(|id| async move {
            Position::new(&self.aggregator, pool, id, user).get_position_info().await
        }))
        .await;
        infos.into_iter().collect()
    }

    // ============================================
    // FLASH-LOAN OPERATIONS
    // ============================================

    pub async fn increase_position(&self, request: &IncreasePositionRequest) -> Result<RouteOutcome> {
        validate_amount(request.amount, "From amount must be greater than 0")?;
        validate_slippage(request.slippage)?;
        validate_leverage(request.leverage)?;
        validate_user(request.user)?;
        check_whitelist(
            request.input_token,
            &increase_tokens(request.market),
            increase_message(request.market),
        )?;

        let pool = self.get_pool_info(request.market, request.position_type).await?;
        self.check_owner(&pool, request.position_id, request.user).await?;
        info!(
            "📈 Increase {} #{} to {}x with {}",
            pool.config.name, request.position_id, request.leverage, request.amount
        );

        Position::new(&self.aggregator, &pool, request.position_id, request.user)
            .increase_position(
                request.input_token,
                request.amount,
                request.leverage,
                request.slippage,
                &request.targets,
            )
            .await
    }

    pub async fn reduce_position(&self, request: &ReducePositionRequest) -> Result<RouteOutcome> {
        if !request.is_close {
            validate_amount(request.amount, "From amount must be greater than 0")?;
        }
        validate_slippage(request.slippage)?;
        validate_position_id(request.position_id)?;
        validate_user(request.user)?;
        check_whitelist(
            request.output_token,
            &reduce_tokens(request.market, request.position_type),
            &reduce_message(request.market, request.position_type),
        )?;

        let pool = self.get_pool_info(request.market, request.position_type).await?;
        self.check_owner(&pool, request.position_id, request.user).await?;
        info!(
            "📉 {} {} #{}",
            if request.is_close { "Close" } else { "Reduce" },
            pool.config.name,
            request.position_id
        );

        Position::new(&self.aggregator, &pool, request.position_id, request.user)
            .reduce_position(
                request.output_token,
                request.amount,
                request.slippage,
                &request.targets,
                request.is_close,
            )
            .await
    }

    pub async fn adjust_position_leverage(&self, request: &AdjustLeverageRequest) -> Result<RouteOutcome> {
        validate_slippage(request.slippage)?;
        validate_leverage(request.leverage)?;
        validate_position_id(request.position_id)?;
        validate_user(request.user)?;

        let pool = self.get_pool_info(request.market, request.position_type).await?;
        self.check_owner(&pool, request.position_id, request.user).await?;
        info!("🎚️ Adjust {} #{} to {}x", pool.config.name, request.position_id, request.leverage);

        Position::new(&self.aggregator, &pool, request.position_id, request.user)
            .adjust_position_leverage(request.leverage, request.slippage, &request.targets)
            .await
    }

    // ============================================
    // MINT ROUTER OPERATIONS
    // ============================================

    pub async fn deposit_and_mint(&self, request: &DepositAndMintRequest) -> Result<MintOutcome> {
        validate_user(request.user)?;
        check_whitelist(
            request.deposit_token,
            &mint_tokens(request.market),
            mint_message(request.market, "Deposit"),
        )?;

        let pool = self.get_pool_info(request.market, PositionType::Long).await?;
        self.check_owner(&pool, request.position_id, request.user).await?;
        info!(
            "🏦 Deposit {} and mint {} fxUSD on {} #{}",
            request.deposit_amount, request.mint_amount, pool.config.name, request.position_id
        );

        Position::new(&self.aggregator, &pool, request.position_id, request.user)
            .deposit_and_mint(request.deposit_token, request.deposit_amount, request.mint_amount)
            .await
    }

    pub async fn repay_and_withdraw(&self, request: &RepayAndWithdrawRequest) -> Result<MintOutcome> {
        validate_position_id(request.position_id)?;
        validate_user(request.user)?;
        check_whitelist(
            request.withdraw_token,
            &mint_tokens(request.market),
            mint_message(request.market, "Withdraw"),
        )?;

        let pool = self.get_pool_info(request.market, PositionType::Long).await?;
        self.check_owner(&pool, request.position_id, request.user).await?;
        info!(
            "🏦 Repay {} fxUSD and withdraw {} on {} #{}",
            request.repay_amount, request.withdraw_amount, pool.config.name, request.position_id
        );

        Position::new(&self.aggregator, &pool, request.position_id, request.user)
            .repay_and_withdraw(request.repay_amount, request.withdraw_amount, request.withdraw_token)
            .await
    }

    /// Existing positions must belong to `user`. New positions (id 0) skip the read.
    async fn check_owner(&self, pool: &PoolInfo, position_id: u64, user: Address) -> Result<()> {
        if position_id == 0 {
            return Ok(());
        }
        let owner = chain::read(
            self.chain.as_ref(),
            pool.config.pool_address,
            IPool::ownerOfCall { tokenId: U256::from(position_id) },
        )
        .await?;
        if owner != user {
            return Err(SdkError::NotOwner);
        }
        Ok(())
    }
}

// ============================================
// INPUT PARSING
// ============================================

/// Parse a hex address, failing with `message`.
pub fn parse_address(input: &str, message: &str) -> Result<Address> {
    input.trim().parse::<Address>().map_err(|_| SdkError::validation(message))
}

/// Parse a token symbol or address, failing with `message`.
pub fn parse_token_input(input: &str, message: &str) -> Result<Address> {
    parse_token(input.trim()).ok_or_else(|| SdkError::validation(message))
}

pub fn parse_position_id(input: &str) -> Result<u64> {
    input
        .trim()
        .parse::<u64>()
        .map_err(|_| SdkError::validation("Position ID must be a positive number"))
}

/// Decimal integer amount in base units
pub fn parse_amount(input: &str, message: &str) -> Result<U256> {
    U256::from_str_radix(input.trim(), 10).map_err(|_| SdkError::validation(message))
}

// ============================================
// VALIDATION
// ============================================

fn validate_amount(amount: U256, message: &str) -> Result<()> {
    if amount.is_zero() {
        return Err(SdkError::validation(message));
    }
    Ok(())
}

fn validate_slippage(slippage: f64) -> Result<()> {
    if !(slippage > 0.0 && slippage < 100.0) {
        return Err(SdkError::validation("Slippage must be between 0 and 100"));
    }
    Ok(())
}

fn validate_leverage(leverage: f64) -> Result<()> {
    if !(leverage > 0.0 && leverage.is_finite()) {
        return Err(SdkError::validation("Leverage must be greater than 0"));
    }
    Ok(())
}

fn validate_position_id(position_id: u64) -> Result<()> {
    if position_id == 0 {
        return Err(SdkError::validation("Position ID must be a positive number"));
    }
    Ok(())
}

fn validate_user(user: Address) -> Result<()> {
    if user.is_zero() {
        return Err(SdkError::validation("User address is not a valid address"));
    }
    Ok(())
}

fn check_whitelist(token: Address, allowed: &[Address], message: &str) -> Result<()> {
    if !allowed.contains(&token) {
        return Err(SdkError::validation(message));
    }
    Ok(())
}

// ============================================
// TOKEN WHITELISTS
// ============================================

fn increase_tokens(market: Market) -> Vec<Address> {
    match market {
        Market::Eth => vec![ETH, STETH, WETH, WSTETH, USDC, USDT, FXUSD],
        Market::Btc => vec![WBTC, USDC, USDT, FXUSD],
    }
}

fn increase_message(market: Market) -> &'static str {
    match market {
        Market::Eth => "Input token address must be eth, stETH, weth, wstETH, usdc, usdt or fxUSD",
        Market::Btc => "Input token address must be WBTC, usdc, usdt or fxUSD",
    }
}

fn reduce_tokens(market: Market, position_type: PositionType) -> Vec<Address> {
    match (market, position_type) {
        (Market::Eth, PositionType::Long) => vec![ETH, STETH, WETH, WSTETH, USDC, USDT, FXUSD],
        (Market::Eth, PositionType::Short) => vec![ETH, WETH, WSTETH, USDC, USDT, FXUSD],
        (Market::Btc, _) => vec![WBTC, USDC, USDT, FXUSD],
    }
}

fn reduce_message(market: Market, position_type: PositionType) -> String {
    match market {
        Market::Eth => format!(
            "Output token address must be eth, {} wstETH, usdc, usdt or fxUSD",
            if position_type == PositionType::Long { "stETH," } else { "" }
        ),
        Market::Btc => "Output token address must be WBTC, usdc, usdt or fxUSD".to_string(),
    }
}

fn mint_tokens(market: Market) -> Vec<Address> {
    match market {
        Market::Eth => vec![ETH, STETH, WETH, WSTETH],
        Market::Btc => vec![WBTC],
    }
}

fn mint_message(market: Market, side: &str) -> &'static str {
    match (market, side) {
        (Market::Eth, "Deposit") => "Deposit token address must be eth, stETH, weth or wstETH",
        (Market::Eth, _) => "Withdraw token address must be eth, stETH, weth or wstETH",
        (Market::Btc, "Deposit") => "Deposit token address must be WBTC",
        (Market::Btc, _) => "Withdraw token address must be WBTC",
    }
}

//! Approval checks
//!
//! Each helper reads the current on-chain approval and returns the
//! transaction to send only when one is actually needed.

use crate::chain::{self, ChainClient};
use crate::contracts::{IPool, IERC20};
use crate::error::Result;
use crate::tokens::is_native;
use crate::types::{TxKind, TxRequest};
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use tracing::debug;

/// ERC20 `approve(spender, amount)` unless the token is native ETH or the
/// allowance already covers `amount`.
pub async fn approve_token(
    chain: &dyn ChainClient,
    token: Address,
    amount: U256,
    spender: Address,
    owner: Address,
) -> Result<Option<TxRequest>> {
    if is_native(token) {
        return Ok(None);
    }

    let allowance = chain::read(chain, token, IERC20::allowanceCall { owner, spender }).await?;
    if allowance >= amount {
        debug!("Allowance {} of {} covers {}", allowance, token, amount);
        return Ok(None);
    }

    Ok(Some(TxRequest {
        kind: TxKind::ApproveToken,
        from: owner,
        to: token,
        data: IERC20::approveCall { spender, amount }.abi_encode().into(),
        value: U256::ZERO,
    }))
}

/// Position NFT approval for `operator`. Nothing to approve for a new
/// position (id 0). With `for_all`, checks and sets operator approval instead.
pub async fn approve_position(
    chain: &dyn ChainClient,
    pool: Address,
    position_id: u64,
    operator: Address,
    owner: Address,
    for_all: bool,
) -> Result<Option<TxRequest>> {
    if position_id == 0 {
        return Ok(None);
    }

    if for_all {
        let approved = chain::read(chain, pool, IPool::isApprovedForAllCall { owner, operator }).await?;
        if approved {
            return Ok(None);
        }
        return Ok(Some(TxRequest {
            kind: TxKind::ApprovePositionForAll,
            from: owner,
            to: pool,
            data: IPool::setApprovalForAllCall { operator, approved: true }.abi_encode().into(),
            value: U256::ZERO,
        }));
    }

    let token_id = U256::from(position_id);
    let approved = chain::read(chain, pool, IPool::getApprovedCall { tokenId: token_id }).await?;
    if approved == operator {
        return Ok(None);
    }

    Ok(Some(TxRequest {
        kind: TxKind::ApprovePosition,
        from: owner,
        to: pool,
        data: IPool::approveCall { to: operator, tokenId: token_id }.abi_encode().into(),
        value: U256::ZERO,
    }))
}

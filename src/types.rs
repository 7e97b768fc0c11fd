//! Request and outcome types shared by the facade, the orchestrator and the CLI

use crate::aggregator::RouteType;
use crate::pool::{Market, PositionType};
use alloy_primitives::{Address, Bytes, U256};
use serde::Serialize;

// ============================================
// REQUESTS
// ============================================

/// Open a position or add to one. `position_id = 0` opens a new position.
#[derive(Debug, Clone)]
pub struct IncreasePositionRequest {
    pub market: Market,
    pub position_type: PositionType,
    pub position_id: u64,
    pub user: Address,
    pub input_token: Address,
    pub amount: U256,
    /// User-facing leverage, e.g. 3.0
    pub leverage: f64,
    /// Percent, e.g. 0.5
    pub slippage: f64,
    /// Empty means the per-token defaults
    pub targets: Vec<RouteType>,
}

/// Reduce or fully close a position.
///
/// `amount` is collateral for longs and debt for shorts.
#[derive(Debug, Clone)]
pub struct ReducePositionRequest {
    pub market: Market,
    pub position_type: PositionType,
    pub position_id: u64,
    pub user: Address,
    pub output_token: Address,
    pub amount: U256,
    pub slippage: f64,
    pub targets: Vec<RouteType>,
    pub is_close: bool,
}

#[derive(Debug, Clone)]
pub struct AdjustLeverageRequest {
    pub market: Market,
    pub position_type: PositionType,
    pub position_id: u64,
    pub user: Address,
    pub leverage: f64,
    pub slippage: f64,
    pub targets: Vec<RouteType>,
}

/// Deposit collateral into a long position and mint fxUSD against it.
#[derive(Debug, Clone)]
pub struct DepositAndMintRequest {
    pub market: Market,
    pub position_id: u64,
    pub user: Address,
    pub deposit_token: Address,
    pub deposit_amount: U256,
    pub mint_amount: U256,
}

/// Repay fxUSD on a long position and withdraw collateral.
#[derive(Debug, Clone)]
pub struct RepayAndWithdrawRequest {
    pub market: Market,
    pub position_id: u64,
    pub user: Address,
    pub repay_amount: U256,
    pub withdraw_amount: U256,
    pub withdraw_token: Address,
}

// ============================================
// TRANSACTIONS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TxKind {
    ApproveToken,
    ApprovePosition,
    ApprovePositionForAll,
    Trade,
}

/// Unsigned transaction before nonce assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub kind: TxKind,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl TxRequest {
    pub fn trade(from: Address, to: Address, data: Bytes, value: U256) -> Self {
        Self { kind: TxKind::Trade, from, to, data, value }
    }
}

/// Ready-to-sign transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "type")]
    pub kind: TxKind,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub nonce: u64,
    pub chain_id: u64,
}

/// Assign consecutive nonces starting at `nonce`, in list order.
pub fn sequence(requests: Vec<TxRequest>, nonce: u64, chain_id: u64) -> Vec<Transaction> {
    requests
        .into_iter()
        .zip(nonce..)
        .map(|(tx, nonce)| Transaction {
            kind: tx.kind,
            from: tx.from,
            to: tx.to,
            data: tx.data,
            value: tx.value,
            nonce,
            chain_id,
        })
        .collect()
}

// ============================================
// OUTCOMES
// ============================================

/// One provider's trade plus the transactions that execute it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteCandidate {
    pub route_type: RouteType,
    pub leverage: f64,
    pub execution_price: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_out: Option<U256>,
    pub colls: U256,
    pub debts: U256,
    pub txs: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOutcome {
    pub position_id: u64,
    pub slippage: f64,
    pub routes: Vec<RouteCandidate>,
}

/// Outcome of a deposit+mint or repay+withdraw
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintOutcome {
    pub position_id: u64,
    pub leverage: f64,
    /// Oracle min price, whole USD
    pub execution_price: U256,
    pub colls: U256,
    pub debts: U256,
    pub txs: Vec<Transaction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{FXUSD, WSTETH};

    #[test]
    fn test_sequence_assigns_consecutive_nonces() {
        let user = Address::repeat_byte(0x11);
        let requests = vec![
            TxRequest {
                kind: TxKind::ApproveToken,
                from: user,
                to: WSTETH,
                data: Bytes::new(),
                value: U256::ZERO,
            },
            TxRequest::trade(user, FXUSD, Bytes::from(vec![1, 2, 3]), U256::from(5u64)),
        ];

        let txs = sequence(requests, 41, 1);
        assert_eq!(txs.iter().map(|t| t.nonce).collect::<Vec<_>>(), vec![41, 42]);
        assert_eq!(txs[1].kind, TxKind::Trade);
        assert_eq!(txs[1].value, U256::from(5u64));
    }

    #[test]
    fn test_transaction_json_shape() {
        let tx = sequence(vec![TxRequest::trade(Address::ZERO, FXUSD, Bytes::new(), U256::ZERO)], 7, 1)
            .remove(0);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "trade");
        assert_eq!(json["chainId"], 1);
        assert_eq!(json["nonce"], 7);

        let kind = serde_json::to_value(TxKind::ApprovePositionForAll).unwrap();
        assert_eq!(kind, "approvePositionForAll");
    }
}

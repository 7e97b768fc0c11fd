//! Velora (ParaSwap) aggregator
//!
//! Quote: `GET /prices`. Route: `POST /transactions/{chain}` with the price
//! route from the quote echoed back. Both need token decimals, which come
//! from the token table or an on-chain `decimals()` read.

use super::{QuoteProvider, QuoteRequest, QuoteResult, RouteRequest, RouteResult, RouteType};
use crate::chain::{self, ChainClient};
use crate::contracts::IERC20;
use crate::error::{Result, SdkError};
use crate::tokens::known_decimals;
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const API_VERSION: &str = "6.2";

pub struct VeloraProvider {
    http: reqwest::Client,
    chain: Arc<dyn ChainClient>,
    base_url: String,
    partner: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricesResponse {
    price_route: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionBody<'a> {
    src_token: Address,
    dest_token: Address,
    src_amount: String,
    price_route: &'a Value,
    src_decimals: u8,
    dest_decimals: u8,
    slippage: u64,
    user_address: Address,
    partner: &'a str,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    to: Option<Address>,
    data: Option<Bytes>,
}

/// Amounts the price route commits to
#[derive(Debug)]
struct PricedRoute {
    route: Value,
    src: U256,
    dst: U256,
}

impl VeloraProvider {
    pub fn new(http: reqwest::Client, chain: Arc<dyn ChainClient>, base_url: &str, partner: &str) -> Self {
        Self {
            http,
            chain,
            base_url: base_url.trim_end_matches('/').to_string(),
            partner: partner.to_string(),
        }
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        if let Some(decimals) = known_decimals(token) {
            return Ok(decimals);
        }
        chain::read(self.chain.as_ref(), token, IERC20::decimalsCall {})
            .await
            .map_err(|e| SdkError::provider(RouteType::Velora, e))
    }

    async fn price_route(&self, src: Address, dst: Address, amount: U256) -> Result<(PricedRoute, u8, u8)> {
        let src_decimals = self.decimals(src).await?;
        let dst_decimals = self.decimals(dst).await?;

        let query = [
            ("srcToken", src.to_string()),
            ("destToken", dst.to_string()),
            ("amount", amount.to_string()),
            ("network", self.chain.chain_id().to_string()),
            ("version", API_VERSION.to_string()),
            ("side", "SELL".to_string()),
            ("srcDecimals", src_decimals.to_string()),
            ("destDecimals", dst_decimals.to_string()),
            ("partner", self.partner.clone()),
        ];

        let response: PricesResponse = self
            .http
            .get(format!("{}/prices", self.base_url))
            .query(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SdkError::provider(RouteType::Velora, e))?
            .json()
            .await
            .map_err(|e| SdkError::provider(RouteType::Velora, e))?;

        Ok((parse_price_route(response)?, src_decimals, dst_decimals))
    }
}

fn parse_price_route(response: PricesResponse) -> Result<PricedRoute> {
    let missing = || SdkError::provider(RouteType::Velora, "Missing price route in response");
    let route = response.price_route.ok_or_else(missing)?;

    let amount = |field: &str| -> Result<U256> {
        let raw = route.get(field).and_then(Value::as_str).ok_or_else(missing)?;
        U256::from_str_radix(raw, 10)
            .map_err(|e| SdkError::provider(RouteType::Velora, format!("Invalid {} {}: {}", field, raw, e)))
    };
    let src = amount("srcAmount")?;
    let dst = amount("destAmount")?;

    Ok(PricedRoute { route, src, dst })
}

fn parse_transaction(response: TransactionResponse, priced: &PricedRoute) -> Result<RouteResult> {
    let missing = || SdkError::provider(RouteType::Velora, "Missing transaction data in response");
    Ok(RouteResult {
        route_type: RouteType::Velora,
        src: priced.src,
        dst: priced.dst,
        to: response.to.ok_or_else(missing)?,
        data: response.data.ok_or_else(missing)?,
    })
}

#[async_trait]
impl QuoteProvider for VeloraProvider {
    fn route_type(&self) -> RouteType {
        RouteType::Velora
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResult> {
        let (priced, _, _) = self.price_route(request.src, request.dst, request.amount).await?;
        Ok(QuoteResult {
            route_type: RouteType::Velora,
            src: priced.src,
            dst: priced.dst,
            convert_data: None,
        })
    }

    async fn get_route(&self, request: &RouteRequest) -> Result<RouteResult> {
        let (priced, src_decimals, dest_decimals) =
            self.price_route(request.src, request.dst, request.amount).await?;

        let body = TransactionBody {
            src_token: request.src,
            dest_token: request.dst,
            src_amount: request.amount.to_string(),
            price_route: &priced.route,
            src_decimals,
            dest_decimals,
            slippage: request.slippage_bps,
            user_address: request.receiver,
            partner: &self.partner,
        };

        let response: TransactionResponse = self
            .http
            .post(format!(
                "{}/transactions/{}?ignoreChecks=true&ignoreGasEstimate=true",
                self.base_url,
                self.chain.chain_id()
            ))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SdkError::provider(RouteType::Velora, e))?
            .json()
            .await
            .map_err(|e| SdkError::provider(RouteType::Velora, e))?;

        parse_transaction(response, &priced)
    }
}

//! Odos smart order router
//!
//! Quote: `POST /sor/quote/v2`. Route: the same quote with the user and
//! slippage attached, then `POST /sor/assemble` for executable calldata.

use super::{QuoteProvider, QuoteRequest, QuoteResult, RouteRequest, RouteResult, RouteType};
use crate::error::{Result, SdkError};
use crate::tokens::placeholder_to_zero;
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Liquidity sources Odos must not route through
const SOURCE_BLACKLIST: [&str; 2] = ["Fluid", "Curve TwoCrypto NG"];

pub struct OdosProvider {
    http: reqwest::Client,
    base_url: String,
    referral_code: String,
    chain_id: u64,
}

// ============================================
// WIRE TYPES
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteBody<'a> {
    chain_id: u64,
    input_tokens: Vec<InputToken>,
    output_tokens: Vec<OutputToken>,
    referral_code: &'a str,
    source_blacklist: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    user_addr: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    slippage_limit_percent: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputToken {
    token_address: Address,
    amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputToken {
    token_address: Address,
    proportion: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssembleBody {
    user_addr: Address,
    path_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    #[serde(default)]
    in_amounts: Vec<String>,
    #[serde(default)]
    out_amounts: Vec<String>,
    path_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssembleResponse {
    transaction: Option<AssembledTransaction>,
    #[serde(default)]
    input_tokens: Vec<TokenAmount>,
    #[serde(default)]
    output_tokens: Vec<TokenAmount>,
}

#[derive(Debug, Deserialize)]
struct AssembledTransaction {
    to: Option<Address>,
    data: Option<Bytes>,
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    amount: String,
}

// ============================================
// PROVIDER
// ============================================

impl OdosProvider {
    pub fn new(http: reqwest::Client, base_url: &str, referral_code: &str, chain_id: u64) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            referral_code: referral_code.to_string(),
            chain_id,
        }
    }

    fn quote_body(&self, src: Address, dst: Address, amount: U256) -> QuoteBody<'_> {
        QuoteBody {
            chain_id: self.chain_id,
            input_tokens: vec![InputToken {
                token_address: placeholder_to_zero(src),
                amount: amount.to_string(),
            }],
            output_tokens: vec![OutputToken {
                token_address: placeholder_to_zero(dst),
                proportion: 1,
            }],
            referral_code: &self.referral_code,
            source_blacklist: &SOURCE_BLACKLIST,
            user_addr: None,
            slippage_limit_percent: None,
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<R> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SdkError::provider(RouteType::Odos, e))?;

        response
            .json::<R>()
            .await
            .map_err(|e| SdkError::provider(RouteType::Odos, e))
    }
}

fn parse_amount(raw: Option<&String>, field: &str) -> Result<U256> {
    let raw = raw.ok_or_else(|| SdkError::provider(RouteType::Odos, format!("Missing {} in response", field)))?;
    U256::from_str_radix(raw, 10)
        .map_err(|e| SdkError::provider(RouteType::Odos, format!("Invalid {} {}: {}", field, raw, e)))
}

fn parse_quote(response: &QuoteResponse) -> Result<(U256, U256)> {
    Ok((
        parse_amount(response.in_amounts.first(), "inAmounts")?,
        parse_amount(response.out_amounts.first(), "outAmounts")?,
    ))
}

fn parse_assembled(response: AssembleResponse) -> Result<RouteResult> {
    let missing = || SdkError::provider(RouteType::Odos, "Missing transaction data from assemble response");
    let transaction = response.transaction.ok_or_else(missing)?;
    let to = transaction.to.ok_or_else(missing)?;
    let data = transaction.data.ok_or_else(missing)?;
    let src = parse_amount(response.input_tokens.first().map(|t| &t.amount), "inputTokens")?;
    let dst = parse_amount(response.output_tokens.first().map(|t| &t.amount), "outputTokens")?;

    Ok(RouteResult { route_type: RouteType::Odos, src, dst, to, data })
}

#[async_trait]
impl QuoteProvider for OdosProvider {
    fn route_type(&self) -> RouteType {
        RouteType::Odos
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResult> {
        let body = self.quote_body(request.src, request.dst, request.amount);
        let response: QuoteResponse = self.post("/sor/quote/v2", &body).await?;
        let (src, dst) = parse_quote(&response)?;

        Ok(QuoteResult { route_type: RouteType::Odos, src, dst, convert_data: None })
    }

    async fn get_route(&self, request: &RouteRequest) -> Result<RouteResult> {
        let mut body = self.quote_body(request.src, request.dst, request.amount);
        body.user_addr = Some(request.receiver);
        body.slippage_limit_percent = Some(request.slippage_percent());

        let quote: QuoteResponse = self.post("/sor/quote/v2", &body).await?;
        let path_id = quote
            .path_id
            .ok_or_else(|| SdkError::provider(RouteType::Odos, "Missing pathId from quote response"))?;

        let assembled: AssembleResponse = self
            .post("/sor/assemble", &AssembleBody { user_addr: request.receiver, path_id })
            .await?;
        parse_assembled(assembled)
    }
}

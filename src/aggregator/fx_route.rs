//! FxRoute: quotes straight from the on-chain MultiPathConverter
//!
//! Uses the static path tables, so it never depends on an external API.
//! The V3 flavour registers as "FxRoute 2".

use super::{QuoteProvider, QuoteRequest, QuoteResult, RouteRequest, RouteResult, RouteType};
use crate::chain::{self, ChainClient};
use crate::contracts::{IMultiPathConverter, MULTI_PATH_CONVERTER};
use crate::error::{Result, SdkError};
use crate::router::{self, RouterTable};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;

pub struct FxRouteProvider {
    chain: Arc<dyn ChainClient>,
    table: RouterTable,
}

impl FxRouteProvider {
    pub fn new(chain: Arc<dyn ChainClient>, table: RouterTable) -> Self {
        Self { chain, table }
    }
}

#[async_trait]
impl QuoteProvider for FxRouteProvider {
    fn route_type(&self) -> RouteType {
        match self.table {
            RouterTable::Legacy => RouteType::FxRoute,
            RouterTable::V3 => RouteType::FxRouteV3,
        }
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResult> {
        let route_type = self.route_type();
        let convert = router::resolve(request.src, request.dst, self.table)
            .map_err(|e| SdkError::provider(route_type, e))?;
        if convert.is_empty() {
            return Err(SdkError::provider(route_type, "no route found"));
        }

        let dst = chain::read(
            self.chain.as_ref(),
            MULTI_PATH_CONVERTER,
            IMultiPathConverter::queryConvertCall {
                amountIn: request.amount,
                encoding: convert.encoding,
                routes: convert.routes.clone(),
            },
        )
        .await
        .map_err(|e| SdkError::provider(route_type, e))?;

        Ok(QuoteResult {
            route_type,
            src: request.amount,
            dst,
            convert_data: Some(convert),
        })
    }

    async fn get_route(&self, request: &RouteRequest) -> Result<RouteResult> {
        let quote = self
            .get_quote(&QuoteRequest {
                src: request.src,
                dst: request.dst,
                amount: request.amount,
            })
            .await?;
        let convert = quote.convert_data.unwrap_or_default();

        let data = IMultiPathConverter::convertCall {
            tokenIn: request.src,
            amountIn: request.amount,
            encoding: convert.encoding,
            routes: convert.routes,
        }
        .abi_encode();

        Ok(RouteResult {
            route_type: quote.route_type,
            src: quote.src,
            dst: quote.dst,
            to: MULTI_PATH_CONVERTER,
            data: data.into(),
        })
    }
}

//! Route Aggregator
//!
//! Fans a swap out to every registered quote provider concurrently, drops
//! the ones that fail and picks the best output. Also hosts the inverse
//! searches the solver uses to find how much to swap for a target output.

pub mod fx_route;
pub mod odos;
pub mod search;
pub mod velora;

pub use fx_route::FxRouteProvider;
pub use odos::OdosProvider;
pub use velora::VeloraProvider;

use crate::chain::ChainClient;
use crate::config::SdkConfig;
use crate::contracts::MULTI_PATH_CONVERTER;
use crate::error::{Result, SdkError};
use crate::router::{self, ConvertData, RouterTable};
use crate::tokens::{FXUSD, WBTC};
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================
// ROUTE TYPES
// ============================================

/// Closed set of quote providers. Registration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteType {
    Velora,
    Odos,
    FxRoute,
    /// Converter paths using the Uniswap V3 WBTC legs
    #[serde(rename = "FxRoute 2")]
    FxRouteV3,
}

impl RouteType {
    pub const ALL: [RouteType; 4] = [
        RouteType::Velora,
        RouteType::Odos,
        RouteType::FxRoute,
        RouteType::FxRouteV3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RouteType::Velora => "Velora",
            RouteType::Odos => "Odos",
            RouteType::FxRoute => "FxRoute",
            RouteType::FxRouteV3 => "FxRoute 2",
        }
    }
}

impl std::fmt::Display for RouteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RouteType {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "velora" | "paraswap" => Ok(RouteType::Velora),
            "odos" => Ok(RouteType::Odos),
            "fxroute" => Ok(RouteType::FxRoute),
            "fxroute2" | "fxroutev3" => Ok(RouteType::FxRouteV3),
            _ => Err(SdkError::validation(format!("Unknown route type: {}", s))),
        }
    }
}

/// Provider list the solver uses when the caller does not pick one.
pub fn default_targets(token: Address) -> Vec<RouteType> {
    if token == WBTC {
        vec![RouteType::FxRoute, RouteType::FxRouteV3, RouteType::Odos, RouteType::Velora]
    } else {
        vec![RouteType::FxRoute, RouteType::Odos, RouteType::Velora]
    }
}

/// FxRoute on a WBTC pair always brings its V3 variant along.
pub fn resolve_targets(src: Address, dst: Address, targets: &[RouteType]) -> Vec<RouteType> {
    let mut resolved = targets.to_vec();
    let touches_wbtc = src == WBTC || dst == WBTC;
    if touches_wbtc && resolved.contains(&RouteType::FxRoute) && !resolved.contains(&RouteType::FxRouteV3) {
        resolved.push(RouteType::FxRouteV3);
    }
    resolved
}

// ============================================
// REQUESTS / RESULTS
// ============================================

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub src: Address,
    pub dst: Address,
    pub amount: U256,
}

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub src: Address,
    pub dst: Address,
    pub amount: U256,
    pub slippage_bps: u64,
    /// Address that executes the swap calldata
    pub receiver: Address,
}

impl RouteRequest {
    /// Slippage as a percent, the unit the HTTP aggregators expect
    pub fn slippage_percent(&self) -> f64 {
        self.slippage_bps as f64 / 100.0
    }
}

#[derive(Debug, Clone)]
pub struct QuoteResult {
    pub route_type: RouteType,
    pub src: U256,
    pub dst: U256,
    /// Converter path, only for on-chain routes
    pub convert_data: Option<ConvertData>,
}

#[derive(Debug, Clone)]
pub struct RouteResult {
    pub route_type: RouteType,
    pub src: U256,
    pub dst: U256,
    /// Contract the swap calldata is sent to
    pub to: Address,
    pub data: Bytes,
}

/// Anything `select_best` can rank
pub trait Ranked {
    fn route_type(&self) -> RouteType;
    fn dst(&self) -> U256;
}

impl Ranked for QuoteResult {
    fn route_type(&self) -> RouteType {
        self.route_type
    }
    fn dst(&self) -> U256 {
        self.dst
    }
}

impl Ranked for RouteResult {
    fn route_type(&self) -> RouteType {
        self.route_type
    }
    fn dst(&self) -> U256 {
        self.dst
    }
}

/// Highest `dst`, or lowest when `reverse`. The first of equal results wins.
pub fn select_best<T: Ranked>(results: &[T], reverse: bool) -> Result<&T> {
    let mut best: Option<&T> = None;
    for candidate in results {
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let better = if reverse {
                    candidate.dst() < current.dst()
                } else {
                    candidate.dst() > current.dst()
                };
                if better { Some(candidate) } else { Some(current) }
            }
        };
    }
    best.ok_or(SdkError::NoRoute)
}

/// Successful provider results plus the winner
#[derive(Debug, Clone)]
pub struct Selection<T> {
    pub best: RouteType,
    pub results: Vec<T>,
}

impl<T: Ranked> Selection<T> {
    fn from_results(results: Vec<T>, reverse: bool) -> Result<Self> {
        let best = select_best(&results, reverse)?.route_type();
        Ok(Self { best, results })
    }

    pub fn best_result(&self) -> Option<&T> {
        self.get(self.best)
    }

    pub fn get(&self, route_type: RouteType) -> Option<&T> {
        self.results.iter().find(|r| r.route_type() == route_type)
    }
}

// ============================================
// PROVIDER TRAIT
// ============================================

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn route_type(&self) -> RouteType;

    /// Expected output for `amount`, no calldata
    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResult>;

    /// Executable swap with slippage protection
    async fn get_route(&self, request: &RouteRequest) -> Result<RouteResult>;
}

// ============================================
// AGGREGATOR
// ============================================

pub struct Aggregator {
    chain: Arc<dyn ChainClient>,
    providers: Vec<Arc<dyn QuoteProvider>>,
}

impl Aggregator {
    /// Register the production providers: Velora, Odos, FxRoute, FxRoute 2.
    pub fn new(chain: Arc<dyn ChainClient>, config: &SdkConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {}", e)))?;

        let providers: Vec<Arc<dyn QuoteProvider>> = vec![
            Arc::new(VeloraProvider::new(
                http.clone(),
                chain.clone(),
                &config.velora_base_url,
                &config.velora_partner,
            )),
            Arc::new(OdosProvider::new(
                http,
                &config.odos_base_url,
                &config.odos_referral_code,
                chain.chain_id(),
            )),
            Arc::new(FxRouteProvider::new(chain.clone(), RouterTable::Legacy)),
            Arc::new(FxRouteProvider::new(chain.clone(), RouterTable::V3)),
        ];

        Ok(Self::with_providers(chain, providers))
    }

    pub fn with_providers(chain: Arc<dyn ChainClient>, providers: Vec<Arc<dyn QuoteProvider>>) -> Self {
        Self { chain, providers }
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    /// Providers matching `targets` in registration order. Empty means all.
    fn select_providers(&self, targets: &[RouteType]) -> Vec<Arc<dyn QuoteProvider>> {
        self.providers
            .iter()
            .filter(|p| targets.is_empty() || targets.contains(&p.route_type()))
            .cloned()
            .collect()
    }

    pub async fn quote(&self, request: &QuoteRequest, targets: &[RouteType]) -> Result<Selection<QuoteResult>> {
        let targets = resolve_targets(request.src, request.dst, targets);
        let providers = self.select_providers(&targets);

        let outcomes = join_all(providers.iter().map(|p| async move {
            (p.route_type(), p.get_quote(request).await)
        }))
        .await;

        let results = collect_successes(outcomes, "quote");
        let selection = Selection::from_results(results, false)?;
        debug!("Quote {} -> {}: best {}", request.src, request.dst, selection.best);
        Ok(selection)
    }

    pub async fn route(&self, request: &RouteRequest, targets: &[RouteType]) -> Result<Selection<RouteResult>> {
        let targets = resolve_targets(request.src, request.dst, targets);
        let providers = self.select_providers(&targets);

        let outcomes = join_all(providers.iter().map(|p| async move {
            (p.route_type(), p.get_route(request).await)
        }))
        .await;

        let results = collect_successes(outcomes, "route");
        let selection = Selection::from_results(results, false)?;
        info!(
            "🔀 Routed {} of {} -> {}: {} providers, best {}",
            request.amount,
            request.src,
            request.dst,
            selection.results.len(),
            selection.best
        );
        Ok(selection)
    }

    // ============================================
    // INVERSE SEARCHES
    // ============================================

    /// fxUSD needed so that swapping it into `token` yields `borrow_amount`.
    pub async fn fx_usd_by_borrow_amount(
        &self,
        hint: U256,
        borrow_amount: U256,
        token: Address,
    ) -> Result<QuoteResult> {
        self.inverse_search(hint, borrow_amount, FXUSD, token, search::FX_USD_SEARCH_FLOOR)
            .await
    }

    /// Amount of `token` needed so that swapping it into fxUSD yields `fx_usd_amount`.
    pub async fn borrow_by_fx_usd_amount(
        &self,
        hint: U256,
        fx_usd_amount: U256,
        token: Address,
        precision: U256,
    ) -> Result<QuoteResult> {
        let floor = precision / U256::from(search::COLLATERAL_FLOOR_DIVISOR);
        self.inverse_search(hint, fx_usd_amount, token, FXUSD, floor).await
    }

    async fn inverse_search(
        &self,
        hint: U256,
        expect: U256,
        from: Address,
        to: Address,
        floor: U256,
    ) -> Result<QuoteResult> {
        let left = hint / U256::from(2u64);
        let right = hint.checked_mul(U256::from(2u64)).ok_or(SdkError::Overflow("search bracket"))?;

        let mut tables = vec![(RouteType::FxRoute, RouterTable::Legacy)];
        if from == WBTC || to == WBTC {
            tables.push((RouteType::FxRouteV3, RouterTable::V3));
        }

        let chain = self.chain.as_ref();
        let searches = tables.into_iter().map(|(route_type, table)| async move {
            let outcome = async {
                let convert = router::resolve(from, to, table)?;
                let found = search::search_amount(
                    chain,
                    MULTI_PATH_CONVERTER,
                    &convert,
                    left,
                    right,
                    expect,
                    floor,
                )
                .await?;
                debug!(
                    "{} search: {} rounds in {:?}, amount {}",
                    route_type, found.rounds, found.elapsed, found.amount
                );
                Ok::<_, SdkError>(QuoteResult {
                    route_type,
                    src: found.amount,
                    dst: expect,
                    convert_data: Some(convert),
                })
            }
            .await;
            (route_type, outcome)
        });

        let results = collect_successes(join_all(searches).await, "search");

        select_best(&results, true)
            .cloned()
            .map_err(|_| SdkError::ExceedsTradingRange)
    }
}

fn collect_successes<T>(outcomes: Vec<(RouteType, Result<T>)>, what: &str) -> Vec<T> {
    outcomes
        .into_iter()
        .filter_map(|(route_type, outcome)| match outcome {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("{} {} failed: {}", route_type, what, e);
                None
            }
        })
        .collect()
}

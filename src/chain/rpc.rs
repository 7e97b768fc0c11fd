//! alloy-backed chain client
//!
//! Batches reads through Multicall3 `aggregate3` with `allowFailure`, split
//! into fixed-size chunks with a pause between chunks so public endpoints
//! do not rate-limit us.

use super::{ChainClient, ContractCall};
use crate::config::SdkConfig;
use crate::contracts::{IMulticall3, MULTICALL3};
use crate::error::{Result, SdkError};
use alloy_primitives::{Address, Bytes};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use alloy_transport::TransportError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

fn rpc_error(context: String, error: TransportError) -> SdkError {
    SdkError::Rpc(format!("{}: {}", context, error))
}

pub struct RpcChainClient {
    provider: DynProvider,
    chain_id: u64,
    batch_size: usize,
    batch_delay: Duration,
}

impl RpcChainClient {
    /// Build the HTTP provider. No request is made until the first call.
    pub fn connect(config: &SdkConfig) -> Result<Self> {
        let url = config
            .rpc_url
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid rpc_url {}: {}", config.rpc_url, e)))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            provider,
            chain_id: config.chain_id,
            batch_size: config.multicall_batch_size.max(1),
            batch_delay: Duration::from_millis(config.multicall_delay_ms),
        })
    }

    /// Execute one Multicall3 aggregate3 call
    async fn execute_multicall(&self, calls: Vec<IMulticall3::Call3>) -> Result<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();
        let result = self.call(MULTICALL3, calldata.into()).await?;

        IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map_err(|e| SdkError::decode("aggregate3", e))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, target: Address, data: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::default().to(target).input(data.into());
        self.provider
            .call(tx)
            .await
            .map_err(|e| rpc_error(format!("eth_call to {} failed", target), e))
    }

    async fn batch_call(&self, calls: &[ContractCall]) -> Result<Vec<Option<Bytes>>> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(calls.len());

        for (index, chunk) in calls.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let call3s = chunk
                .iter()
                .map(|c| IMulticall3::Call3 {
                    target: c.target,
                    allowFailure: true,
                    callData: c.data.clone(),
                })
                .collect();

            match self.execute_multicall(call3s).await {
                Ok(returned) if returned.len() == chunk.len() => {
                    results.extend(returned.into_iter().map(|r| {
                        if r.success { Some(r.returnData) } else { None }
                    }));
                }
                Ok(returned) => {
                    warn!(
                        "Multicall chunk {} returned {} results for {} calls",
                        index,
                        returned.len(),
                        chunk.len()
                    );
                    results.extend(std::iter::repeat(None).take(chunk.len()));
                }
                Err(e) => {
                    warn!("Multicall chunk {} failed: {}", index, e);
                    results.extend(std::iter::repeat(None).take(chunk.len()));
                }
            }
        }

        debug!(
            "📦 Batched {} reads in {:?} ({} per chunk)",
            calls.len(),
            start.elapsed(),
            self.batch_size
        );
        Ok(results)
    }

    async fn get_nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(|e| rpc_error(format!("nonce lookup for {} failed", address), e))
    }
}

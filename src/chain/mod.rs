//! Chain access
//!
//! Everything that touches a node goes through `ChainClient`: single
//! `eth_call`s, batched reads and nonce lookups. The production client
//! batches through Multicall3; tests substitute an in-memory chain.

mod rpc;

pub use rpc::RpcChainClient;

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// A single read in a batch
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub target: Address,
    pub data: Bytes,
}

impl ContractCall {
    pub fn new<C: SolCall>(target: Address, call: &C) -> Self {
        Self { target, data: call.abi_encode().into() }
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// `eth_call` against the latest block
    async fn call(&self, target: Address, data: Bytes) -> Result<Bytes>;

    /// Batched reads. Output order matches input; a failed entry is `None`.
    async fn batch_call(&self, calls: &[ContractCall]) -> Result<Vec<Option<Bytes>>>;

    /// Pending transaction count for `address`
    async fn get_nonce(&self, address: Address) -> Result<u64>;
}

/// Encode, call and decode a single typed read.
pub async fn read<C>(client: &dyn ChainClient, target: Address, call: C) -> Result<C::Return>
where
    C: SolCall + Send,
{
    let raw = client.call(target, call.abi_encode().into()).await?;
    C::abi_decode_returns(&raw).map_err(|e| SdkError::decode(C::SIGNATURE, e))
}

/// Decode one entry of a `batch_call` result. Missing or malformed entries are `None`.
pub fn decode_entry<C: SolCall>(entry: Option<&Option<Bytes>>) -> Option<C::Return> {
    entry
        .and_then(|raw| raw.as_ref())
        .and_then(|raw| C::abi_decode_returns(raw).ok())
}

// ============================================
// CLIENT REGISTRY
// ============================================

/// Memoises RPC clients per (chain id, endpoint).
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<(u64, String), Arc<RpcChainClient>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_connect(&self, config: &SdkConfig) -> Result<Arc<RpcChainClient>> {
        let key = (config.chain_id, config.rpc_url.clone());
        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = Arc::new(RpcChainClient::connect(config)?);
        info!("🔌 Connected chain {} via {}", config.chain_id, config.rpc_url);
        clients.insert(key, client.clone());
        Ok(client)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

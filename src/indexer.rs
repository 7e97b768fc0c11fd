//! Position index
//!
//! Listing a user's positions needs an off-chain index: the pools are
//! ERC-721s without enumeration. The HTTP index answers
//! `GET {base}/positions?pool=..&owner=..` with `{"positionIds": [..]}`.

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait PositionIndex: Send + Sync {
    /// Position ids held by `owner` in `pool`
    async fn positions_of(&self, pool: Address, owner: Address) -> Result<Vec<u64>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionsResponse {
    #[serde(default)]
    position_ids: Vec<u64>,
}

pub struct HttpPositionIndex {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPositionIndex {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build from `position_index_url`. No URL configured is an error.
    pub fn from_config(config: &SdkConfig) -> Result<Self> {
        let base_url = config
            .position_index_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SdkError::Config("position_index_url is not set".to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::new(http, base_url))
    }

    fn positions_url(&self) -> String {
        format!("{}/positions", self.base_url)
    }
}

#[async_trait]
impl PositionIndex for HttpPositionIndex {
    async fn positions_of(&self, pool: Address, owner: Address) -> Result<Vec<u64>> {
        let response = self
            .http
            .get(self.positions_url())
            .query(&[("pool", pool.to_string()), ("owner", owner.to_string())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SdkError::PositionIndex(e.to_string()))?;

        let body: PositionsResponse = response
            .json()
            .await
            .map_err(|e| SdkError::PositionIndex(e.to_string()))?;

        debug!("Index lists {} positions for {} in {}", body.position_ids.len(), owner, pool);
        Ok(body.position_ids)
    }
}

/// Index used when none is configured: every lookup fails with a config error.
pub struct NoPositionIndex;

#[async_trait]
impl PositionIndex for NoPositionIndex {
    async fn positions_of(&self, _pool: Address, _owner: Address) -> Result<Vec<u64>> {
        Err(SdkError::Config("position_index_url is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_base_url_is_config_error() {
        let config = SdkConfig::default();
        let err = HttpPositionIndex::from_config(&config).err().unwrap();
        assert!(matches!(err, SdkError::Config(_)));

        let config = SdkConfig { position_index_url: Some(String::new()), ..SdkConfig::default() };
        assert!(HttpPositionIndex::from_config(&config).is_err());
    }

    #[test]
    fn test_positions_url_trims_slash() {
        let index = HttpPositionIndex::new(reqwest::Client::new(), "https://index.example/api/");
        assert_eq!(index.positions_url(), "https://index.example/api/positions");
    }

    #[test]
    fn test_response_shape() {
        let body: PositionsResponse = serde_json::from_str(r#"{"positionIds":[3,17]}"#).unwrap();
        assert_eq!(body.position_ids, vec![3, 17]);

        let empty: PositionsResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.position_ids.is_empty());
    }

    #[tokio::test]
    async fn test_no_index_fails_lookups() {
        let err = NoPositionIndex.positions_of(Address::ZERO, Address::ZERO).await.unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }
}

//! Blockchain Data Collaborator
//!
//! Interface to the explorer/full-node data services consumed by the
//! validation pipeline: security flags, account tags and balances. The
//! trait keeps the pipeline independently testable; the HTTP
//! implementation talks to TronScan/TronGrid.

use crate::config::{Config, Network, ADVISORY_TIMEOUT};
use crate::error::AgentError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Security flags for an address as reported by the explorer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityInfo {
    /// On a stablecoin blacklist.
    #[serde(default, alias = "is_black_list")]
    pub blacklisted: bool,
    /// Fraud transactions observed in history.
    #[serde(default, alias = "has_fraud_transaction")]
    pub fraud_transactions: bool,
    /// Community/explorer labels attached to the address.
    #[serde(default, alias = "tags")]
    pub labels: Vec<String>,
    /// Suspicious activity pattern flag.
    #[serde(default)]
    pub suspicious_activity: bool,
    /// Address absent from the explorer database (new address).
    #[serde(skip)]
    pub unknown_to_explorer: bool,
}

/// One token position in a wallet portfolio.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub amount: f64,
    #[serde(default)]
    pub value_usd: f64,
}

/// Wallet portfolio snapshot.
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    pub total_value_usd: f64,
    pub tokens: Vec<TokenBalance>,
}

/// Read-only blockchain data service.
#[async_trait]
pub trait ChainDirectory: Send + Sync {
    /// Security flags for an address.
    async fn account_security(
        &self,
        address: &str,
        network: Network,
    ) -> Result<SecurityInfo, AgentError>;

    /// Explorer tags for an address (deny-list source).
    async fn account_tags(
        &self,
        address: &str,
        network: Network,
    ) -> Result<Vec<String>, AgentError>;

    /// Balance/portfolio view of a wallet.
    async fn wallet_portfolio(
        &self,
        address: &str,
        network: Network,
    ) -> Result<Portfolio, AgentError>;
}

/// TronScan/TronGrid backed implementation.
pub struct HttpChainDirectory {
    client: reqwest::Client,
    tronscan_api_key: Option<String>,
}

impl HttpChainDirectory {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(ADVISORY_TIMEOUT)
                .build()
                .unwrap_or_default(),
            tronscan_api_key: config.tronscan_api_key.clone(),
        }
    }

    fn scan_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(key) = &self.tronscan_api_key {
            req = req.header("TRON-PRO-API-KEY", key);
        }
        req
    }

    async fn get_json(&self, req: reqwest::RequestBuilder) -> Result<Value, AgentError> {
        let response = req
            .send()
            .await
            .map_err(|e| AgentError::Upstream(e.to_string()))?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AgentError::Upstream("not found".into()));
        }
        if !status.is_success() {
            return Err(AgentError::Upstream(format!("HTTP {}", status)));
        }
        response
            .json()
            .await
            .map_err(|e| AgentError::Upstream(e.to_string()))
    }
}

#[async_trait]
impl ChainDirectory for HttpChainDirectory {
    async fn account_security(
        &self,
        address: &str,
        network: Network,
    ) -> Result<SecurityInfo, AgentError> {
        let url = format!("{}/account/security?address={}", network.scan_url(), address);
        debug!("Security lookup: {}", address);

        match self.get_json(self.scan_request(&url)).await {
            Ok(data) => {
                let mut info: SecurityInfo =
                    serde_json::from_value(data).unwrap_or_default();
                info.unknown_to_explorer = false;
                Ok(info)
            }
            // Absent from the database reads as a new address, not an outage.
            Err(AgentError::Upstream(msg)) if msg == "not found" => Ok(SecurityInfo {
                unknown_to_explorer: true,
                ..Default::default()
            }),
            Err(e) => Err(e),
        }
    }

    async fn account_tags(
        &self,
        address: &str,
        network: Network,
    ) -> Result<Vec<String>, AgentError> {
        let url = format!(
            "{}/account/tokens?address={}&start=0&limit=1",
            network.scan_url(),
            address
        );
        let data = self.get_json(self.scan_request(&url)).await?;

        // Tags appear either at the top level or on the first account row.
        let tags = data
            .get("tags")
            .or_else(|| {
                data.get("data")
                    .and_then(|d| d.as_array())
                    .and_then(|rows| rows.first())
                    .and_then(|row| row.get("tags"))
            })
            .and_then(|t| t.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(tags)
    }

    async fn wallet_portfolio(
        &self,
        address: &str,
        network: Network,
    ) -> Result<Portfolio, AgentError> {
        let url = format!(
            "{}/account/tokens?address={}&start=0&limit=20",
            network.scan_url(),
            address
        );
        let data = self.get_json(self.scan_request(&url)).await?;

        let mut tokens = Vec::new();
        let mut total = 0.0;
        if let Some(rows) = data.get("data").and_then(|d| d.as_array()) {
            for row in rows {
                let symbol = row
                    .get("tokenAbbr")
                    .and_then(|s| s.as_str())
                    .unwrap_or("UNKNOWN")
                    .to_uppercase();
                let amount = row
                    .get("quantity")
                    .and_then(value_as_f64)
                    .unwrap_or(0.0);
                let value_usd = row
                    .get("amountInUsd")
                    .and_then(value_as_f64)
                    .unwrap_or(0.0);
                total += value_usd;
                tokens.push(TokenBalance {
                    symbol,
                    amount,
                    value_usd,
                });
            }
        }
        tokens.sort_by(|a, b| {
            b.value_usd
                .partial_cmp(&a.value_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(Portfolio {
            total_value_usd: total,
            tokens,
        })
    }
}

/// Explorer payloads mix numeric and string encodings for amounts.
fn value_as_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_info_aliases() {
        let data = serde_json::json!({
            "is_black_list": true,
            "has_fraud_transaction": false,
            "tags": ["Scam"]
        });
        let info: SecurityInfo = serde_json::from_value(data).unwrap();
        assert!(info.blacklisted);
        assert!(!info.fraud_transactions);
        assert_eq!(info.labels, vec!["Scam".to_string()]);
    }

    #[test]
    fn test_value_as_f64_string_encoding() {
        assert_eq!(value_as_f64(&serde_json::json!("12.5")), Some(12.5));
        assert_eq!(value_as_f64(&serde_json::json!(3)), Some(3.0));
        assert_eq!(value_as_f64(&serde_json::json!("abc")), None);
    }
}

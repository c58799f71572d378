//! Recipient Safety Classification
//!
//! Two independent checks feed the transfer pipeline:
//! - the deny-list check classifies explorer tags as safe / warning /
//!   confirmed-malicious (the only hard gate), and
//! - risk scoring derives a severity from the explorer's security flags
//!   (advisory only).

use crate::chain::{ChainDirectory, SecurityInfo};
use crate::config::{Network, DENY_LIST_CACHE_TTL};
use crate::error::AgentError;
use moka::future::Cache;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tags that mark an address as confirmed malicious.
static DANGER_TAGS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["scam", "phishing", "fake", "fraud", "malicious", "hack", "exploit", "rugpull"]
        .into_iter()
        .collect()
});

/// Tags that warrant caution without blocking.
static WARNING_TAGS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["mixer", "gambling", "laundering", "suspicious"].into_iter().collect());

const BASE58_CHARS: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Expected length of a base58check TRON address.
const ADDRESS_LEN: usize = 34;

/// Deny-list classification of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyListStatus {
    Safe,
    Warning,
    ConfirmedMalicious,
    /// Check could not be performed.
    Unknown,
}

/// Deny-list check result.
#[derive(Debug, Clone)]
pub struct DenyListReport {
    pub status: DenyListStatus,
    pub tags: Vec<String>,
    pub warnings: Vec<String>,
    pub source: String,
}

/// Severity classification of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Risk scoring result.
#[derive(Debug, Clone)]
pub struct RiskReport {
    pub level: RiskLevel,
    pub warnings: Vec<String>,
    pub labels: Vec<String>,
    pub recommendation: String,
}

/// Validate the shape of a destination identifier.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LEN
        && address.starts_with('T')
        && address.chars().all(|c| BASE58_CHARS.contains(c))
}

/// Classify explorer tags into a deny-list verdict.
pub fn classify_tags(tags: &[String]) -> (DenyListStatus, Vec<String>) {
    if tags.is_empty() {
        return (DenyListStatus::Safe, Vec::new());
    }

    let lower: HashSet<String> = tags.iter().map(|t| t.to_lowercase()).collect();

    let danger: Vec<&str> = DANGER_TAGS
        .iter()
        .copied()
        .filter(|t| lower.contains(*t))
        .collect();
    if !danger.is_empty() {
        let warnings = vec![format!("Address tagged as {} on TronScan", danger.join(", "))];
        return (DenyListStatus::ConfirmedMalicious, warnings);
    }

    let caution: Vec<&str> = WARNING_TAGS
        .iter()
        .copied()
        .filter(|t| lower.contains(*t))
        .collect();
    if !caution.is_empty() {
        let warnings = vec![format!("Address associated with {}", caution.join(", "))];
        return (DenyListStatus::Warning, warnings);
    }

    (DenyListStatus::Safe, Vec::new())
}

/// Deny-list checker with a short-lived verdict cache.
pub struct DenyListChecker {
    chain: Arc<dyn ChainDirectory>,
    cache: Cache<String, DenyListReport>,
}

impl DenyListChecker {
    pub fn new(chain: Arc<dyn ChainDirectory>) -> Self {
        Self {
            chain,
            cache: Cache::builder().time_to_live(DENY_LIST_CACHE_TTL).build(),
        }
    }

    /// Check an address against the public tag database.
    ///
    /// Testnets have no tag database, so the check reports safe there.
    /// Upstream failures degrade to `Unknown` rather than erroring.
    pub async fn check(&self, address: &str, network: Network) -> DenyListReport {
        if !network.has_tag_database() {
            return DenyListReport {
                status: DenyListStatus::Safe,
                tags: Vec::new(),
                warnings: Vec::new(),
                source: "tronscan_testnet_unavailable".to_string(),
            };
        }

        let key = format!("{}:{}", network.as_str(), address);
        if let Some(cached) = self.cache.get(&key).await {
            debug!("Deny-list cache hit for {}", address);
            return cached;
        }

        let report = match self.chain.account_tags(address, network).await {
            Ok(tags) => {
                let (status, warnings) = classify_tags(&tags);
                DenyListReport {
                    status,
                    tags,
                    warnings,
                    source: "tronscan".to_string(),
                }
            }
            Err(e) => {
                warn!("Deny-list check failed for {}: {}", address, e);
                DenyListReport {
                    status: DenyListStatus::Unknown,
                    tags: Vec::new(),
                    warnings: vec![format!("Could not verify with TronScan ({})", e)],
                    source: "tronscan_error".to_string(),
                }
            }
        };

        self.cache.insert(key, report.clone()).await;
        report
    }
}

/// Derive a severity from explorer security flags.
pub fn assess_security(info: &SecurityInfo) -> RiskReport {
    let mut warnings = Vec::new();
    let mut level = RiskLevel::Safe;

    if info.unknown_to_explorer {
        return RiskReport {
            level: RiskLevel::Low,
            warnings: vec!["Address not found in TronScan database (new address)".to_string()],
            labels: Vec::new(),
            recommendation: "Low risk - address has no history".to_string(),
        };
    }

    if info.blacklisted {
        warnings.push("Address is on stablecoin blacklist".to_string());
        level = RiskLevel::Critical;
    }

    if info.fraud_transactions {
        warnings.push("Fraud transactions detected in history".to_string());
        if level != RiskLevel::Critical {
            level = RiskLevel::High;
        }
    }

    for label in &info.labels {
        let lower = label.to_lowercase();
        if DANGER_TAGS.iter().any(|d| lower.contains(d)) {
            warnings.push(format!("Reported as: {}", label));
            level = RiskLevel::Critical;
        }
    }

    if info.suspicious_activity && level == RiskLevel::Safe {
        warnings.push("Suspicious activity pattern detected".to_string());
        level = RiskLevel::Medium;
    }

    let recommendation = match level {
        RiskLevel::Critical => {
            "STRONGLY RECOMMEND: DO NOT INTERACT - confirmed malicious address".to_string()
        }
        RiskLevel::High => "NOT RECOMMENDED: high fraud risk detected".to_string(),
        RiskLevel::Medium => "CAUTION ADVISED: multiple warning signs present".to_string(),
        RiskLevel::Low => "Low risk - minor warnings present, proceed with care".to_string(),
        RiskLevel::Safe => "Safe to interact - no risks detected".to_string(),
        RiskLevel::Unknown => "Unable to verify - proceed with extreme caution".to_string(),
    };

    RiskReport {
        level,
        warnings,
        labels: info.labels.clone(),
        recommendation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        assert!(!is_valid_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6")); // short
        assert!(!is_valid_address("AR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t")); // no T prefix
        assert!(!is_valid_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj0t")); // 0 not base58
    }

    #[test]
    fn test_tag_classification() {
        let (status, warnings) = classify_tags(&["Scam".to_string()]);
        assert_eq!(status, DenyListStatus::ConfirmedMalicious);
        assert!(warnings[0].contains("scam"));

        let (status, _) = classify_tags(&["Gambling".to_string()]);
        assert_eq!(status, DenyListStatus::Warning);

        let (status, warnings) = classify_tags(&["Exchange".to_string()]);
        assert_eq!(status, DenyListStatus::Safe);
        assert!(warnings.is_empty());

        let (status, _) = classify_tags(&[]);
        assert_eq!(status, DenyListStatus::Safe);
    }

    #[test]
    fn test_blacklist_dominates_severity() {
        let info = SecurityInfo {
            blacklisted: true,
            fraud_transactions: true,
            ..Default::default()
        };
        let report = assess_security(&info);
        assert_eq!(report.level, RiskLevel::Critical);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_fraud_alone_is_high() {
        let info = SecurityInfo {
            fraud_transactions: true,
            ..Default::default()
        };
        assert_eq!(assess_security(&info).level, RiskLevel::High);
    }

    #[test]
    fn test_new_address_is_low() {
        let info = SecurityInfo {
            unknown_to_explorer: true,
            ..Default::default()
        };
        let report = assess_security(&info);
        assert_eq!(report.level, RiskLevel::Low);
        assert!(report.warnings[0].contains("new address"));
    }

    struct FailingChain;

    #[async_trait]
    impl ChainDirectory for FailingChain {
        async fn account_security(
            &self,
            _address: &str,
            _network: Network,
        ) -> Result<SecurityInfo, AgentError> {
            Err(AgentError::Upstream("timeout".into()))
        }

        async fn account_tags(
            &self,
            _address: &str,
            _network: Network,
        ) -> Result<Vec<String>, AgentError> {
            Err(AgentError::Upstream("timeout".into()))
        }

        async fn wallet_portfolio(
            &self,
            _address: &str,
            _network: Network,
        ) -> Result<crate::chain::Portfolio, AgentError> {
            Err(AgentError::Upstream("timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_deny_list_degrades_to_unknown() {
        let checker = DenyListChecker::new(Arc::new(FailingChain));
        let report = checker
            .check("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", Network::Mainnet)
            .await;
        assert_eq!(report.status, DenyListStatus::Unknown);
        assert!(!report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_testnet_skips_tag_database() {
        let checker = DenyListChecker::new(Arc::new(FailingChain));
        let report = checker
            .check("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", Network::Nile)
            .await;
        assert_eq!(report.status, DenyListStatus::Safe);
        assert_eq!(report.source, "tronscan_testnet_unavailable");
    }
}

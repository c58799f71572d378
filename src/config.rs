//! Configuration management
//!
//! Environment-driven settings plus the named heuristic constants used by
//! the validation pipeline and skill generator.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Timeout applied to each advisory upstream call. A timed-out advisory
/// step degrades to `unknown` rather than blocking the pipeline.
pub const ADVISORY_TIMEOUT: Duration = Duration::from_secs(10);

/// TTL for cached deny-list verdicts.
pub const DENY_LIST_CACHE_TTL: Duration = Duration::from_secs(300);

/// Conversation window: turns kept in the process-wide log.
pub const MAX_HISTORY_TURNS: usize = 50;

/// Turns of history injected into each completion request.
pub const HISTORY_CONTEXT_TURNS: usize = 10;

/// Typical energy cost of a TRC20 transfer.
pub const TRC20_TRANSFER_ENERGY: u64 = 28_000;

/// Bandwidth cost of a plain TRX transfer.
pub const TRX_TRANSFER_BANDWIDTH: u64 = 270;

/// Requirement length (chars) above which generation complexity is Medium.
pub const COMPLEXITY_MEDIUM_CHARS: usize = 100;

/// Requirement length (chars) above which generation complexity is High.
pub const COMPLEXITY_HIGH_CHARS: usize = 200;

/// TRON network selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Nile,
    Shasta,
}

impl Network {
    /// Parse a network name, falling back to the Nile testnet.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "mainnet" => Self::Mainnet,
            "shasta" => Self::Shasta,
            _ => Self::Nile,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Nile => "nile",
            Self::Shasta => "shasta",
        }
    }

    /// Full-node (TronGrid) base URL.
    pub fn node_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://api.trongrid.io",
            Self::Nile => "https://nile.trongrid.io",
            Self::Shasta => "https://api.shasta.trongrid.io",
        }
    }

    /// Explorer (TronScan) API base URL.
    pub fn scan_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://apilist.tronscanapi.com/api",
            Self::Nile => "https://nileapi.tronscan.org/api",
            Self::Shasta => "https://api.shasta.tronscan.org/api",
        }
    }

    /// The public tag/label database only exists for mainnet.
    pub fn has_tag_database(&self) -> bool {
        matches!(self, Self::Mainnet)
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI-compatible completion endpoint base URL.
    pub ai_api_base: String,

    /// API key for the completion service (optional - agent falls back
    /// to a static reply when absent).
    pub ai_api_key: Option<String>,

    /// Model identifier passed to the completion service.
    pub ai_model: String,

    /// TronGrid API key (optional).
    pub trongrid_api_key: Option<String>,

    /// TronScan API key (optional).
    pub tronscan_api_key: Option<String>,

    /// System-tier skills directory.
    pub skills_dir: PathBuf,

    /// Personal-tier (generated) skills directory.
    pub personal_skills_dir: PathBuf,

    /// Contact store file.
    pub contacts_path: PathBuf,

    /// Default network when a request does not name one.
    pub default_network: Network,

    /// HTTP listen port for the wiring binary.
    pub listen_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let ai_api_base = std::env::var("AI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let ai_api_key = std::env::var("AI_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();
        let ai_model =
            std::env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let trongrid_api_key = std::env::var("TRONGRID_API_KEY").ok();
        let tronscan_api_key = std::env::var("TRONSCAN_API_KEY").ok();

        let skills_dir = std::env::var("COPILOT_SKILLS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("skills"));
        let personal_skills_dir = std::env::var("COPILOT_PERSONAL_SKILLS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("personal-skills"));

        let contacts_path = std::env::var("COPILOT_CONTACTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/contacts.json"));

        let default_network = Network::parse(
            &std::env::var("COPILOT_NETWORK").unwrap_or_else(|_| "nile".to_string()),
        );

        let listen_port = std::env::var("COPILOT_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);

        Ok(Self {
            ai_api_base,
            ai_api_key,
            ai_model,
            trongrid_api_key,
            tronscan_api_key,
            skills_dir,
            personal_skills_dir,
            contacts_path,
            default_network,
            listen_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse_fallback() {
        assert_eq!(Network::parse("mainnet"), Network::Mainnet);
        assert_eq!(Network::parse("Shasta"), Network::Shasta);
        assert_eq!(Network::parse("nile"), Network::Nile);
        assert_eq!(Network::parse("unknown"), Network::Nile);
    }

    #[test]
    fn test_tag_database_mainnet_only() {
        assert!(Network::Mainnet.has_tag_database());
        assert!(!Network::Nile.has_tag_database());
        assert!(!Network::Shasta.has_tag_database());
    }
}

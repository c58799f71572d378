//! Transaction Construction Collaborator
//!
//! Builds unsigned transfer payloads through the full-node API. The
//! trait isolates the pipeline's final step from node specifics; signing
//! and broadcast stay in the user's wallet.

use crate::config::{Config, Network, ADVISORY_TIMEOUT, TRC20_TRANSFER_ENERGY, TRX_TRANSFER_BANDWIDTH};
use crate::error::AgentError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

/// SUN per TRX.
const SUN_PER_TRX: f64 = 1_000_000.0;

/// Decimals assumed for supported TRC20 tokens (USDT/USDD use 6).
const TRC20_DECIMALS: i32 = 6;

/// Fee limit attached to TRC20 contract calls, in SUN.
const TRC20_FEE_LIMIT_SUN: u64 = 100_000_000;

/// Known token contracts per network.
const TOKEN_ADDRESSES: &[(&str, &str, &str)] = &[
    ("mainnet", "USDT", "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"),
    ("mainnet", "USDD", "TPYmHEhy5n8TCEfYGqW2rPxsghSfzghPDn"),
    ("mainnet", "BTT", "TAFjULxiVgT4qWk6UZwjqwZXTSaGaqnVp4"),
    ("mainnet", "JST", "TCFLL5dx5ZJdKnWuesXxi1VPwjLVmWZZy9"),
    ("nile", "USDT", "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf"),
];

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// A transfer the caller wants built.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_address: String,
    pub to_address: String,
    /// "TRX" or a TRC20 symbol/contract address.
    pub token: String,
    pub amount: f64,
    pub memo: Option<String>,
    pub network: Network,
}

impl TransferRequest {
    /// Whether this moves the native coin (no metered energy needed).
    pub fn is_native(&self) -> bool {
        self.token.eq_ignore_ascii_case("TRX")
    }
}

/// Metadata describing a built transfer for the signing card.
#[derive(Debug, Clone, Serialize)]
pub struct TransferMetadata {
    #[serde(rename = "type")]
    pub transfer_type: String,
    pub token: String,
    pub amount: f64,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub estimated_energy: u64,
    pub estimated_bandwidth: u64,
    pub instructions: Vec<String>,
}

/// An unsigned payload plus its metadata.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub transaction: Value,
    pub metadata: TransferMetadata,
}

/// Builds unsigned transactions.
#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    async fn build_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<UnsignedTransaction, AgentError>;
}

/// Resolve a token symbol to its contract address on a network, falling
/// back to the mainnet address and finally to the literal value (already
/// a contract address).
pub fn resolve_token_address(token: &str, network: Network) -> String {
    let token_upper = token.to_uppercase();
    let lookup = |net: &str| {
        TOKEN_ADDRESSES
            .iter()
            .find(|(n, sym, _)| *n == net && *sym == token_upper)
            .map(|(_, _, addr)| addr.to_string())
    };

    lookup(network.as_str())
        .or_else(|| lookup("mainnet"))
        .unwrap_or_else(|| token.to_string())
}

/// Decode a base58check address to its 21-byte hex form (0x41-prefixed).
///
/// The trailing 4 checksum bytes are stripped without verification; the
/// node rejects invalid addresses anyway.
pub fn base58_to_hex(address: &str) -> Option<String> {
    let mut bytes: Vec<u8> = vec![0];
    for c in address.chars() {
        let digit = BASE58_ALPHABET.find(c)? as u32;
        let mut carry = digit;
        for b in bytes.iter_mut().rev() {
            let value = (*b as u32) * 58 + carry;
            *b = (value & 0xff) as u8;
            carry = value >> 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    // Leading '1' characters encode leading zero bytes.
    let leading_zeros = address.chars().take_while(|c| *c == '1').count();
    for _ in 0..leading_zeros {
        bytes.insert(0, 0);
    }
    while bytes.first() == Some(&0) && bytes.len() > 25 {
        bytes.remove(0);
    }
    // 21-byte payload + 4-byte checksum.
    if bytes.len() != 25 {
        return None;
    }
    bytes.truncate(21);
    Some(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

/// ABI-encode the (recipient, amount) pair for `transfer(address,uint256)`.
fn encode_transfer_params(to_address: &str, amount: u128) -> Result<String, AgentError> {
    let hex = base58_to_hex(to_address)
        .ok_or_else(|| AgentError::Validation(format!("Invalid recipient address: {}", to_address)))?;
    // Drop the 0x41 network prefix byte; pad the 20-byte body to a word.
    let body = &hex[2..];
    Ok(format!("{:0>64}{:064x}", body, amount))
}

/// Full-node backed builder.
pub struct HttpTransactionBuilder {
    client: reqwest::Client,
    trongrid_api_key: Option<String>,
}

impl HttpTransactionBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(ADVISORY_TIMEOUT)
                .build()
                .unwrap_or_default(),
            trongrid_api_key: config.trongrid_api_key.clone(),
        }
    }

    async fn post_node(
        &self,
        network: Network,
        path: &str,
        body: Value,
    ) -> Result<Value, AgentError> {
        let url = format!("{}{}", network.node_url(), path);
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.trongrid_api_key {
            req = req.header("TRON-PRO-API-KEY", key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| AgentError::Upstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AgentError::Upstream(format!(
                "node returned HTTP {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Upstream(e.to_string()))?;

        // Node-level failures come back as an Error field on a 200.
        if let Some(err) = data.get("Error").and_then(|e| e.as_str()) {
            return Err(AgentError::Upstream(err.to_string()));
        }
        Ok(data)
    }
}

#[async_trait]
impl TransactionBuilder for HttpTransactionBuilder {
    async fn build_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<UnsignedTransaction, AgentError> {
        debug!(
            "Building transfer: {} {} -> {} on {}",
            request.amount,
            request.token,
            request.to_address,
            request.network.as_str()
        );

        if request.is_native() {
            let amount_sun = (request.amount * SUN_PER_TRX) as u64;
            let transaction = self
                .post_node(
                    request.network,
                    "/wallet/createtransaction",
                    json!({
                        "owner_address": request.from_address,
                        "to_address": request.to_address,
                        "amount": amount_sun,
                        "visible": true,
                    }),
                )
                .await?;

            Ok(UnsignedTransaction {
                transaction,
                metadata: TransferMetadata {
                    transfer_type: "TRX_TRANSFER".to_string(),
                    token: "TRX".to_string(),
                    amount: request.amount,
                    recipient: request.to_address.clone(),
                    memo: request.memo.clone(),
                    estimated_energy: 0,
                    estimated_bandwidth: TRX_TRANSFER_BANDWIDTH,
                    instructions: vec![
                        "Review the recipient address carefully".to_string(),
                        "Verify the amount".to_string(),
                        format!(
                            "Ensure you have ~{} bandwidth (free if available)",
                            TRX_TRANSFER_BANDWIDTH
                        ),
                        "Sign in your wallet and broadcast".to_string(),
                    ],
                },
            })
        } else {
            let contract = resolve_token_address(&request.token, request.network);
            let amount_units =
                (request.amount * 10f64.powi(TRC20_DECIMALS)) as u128;
            let parameter = encode_transfer_params(&request.to_address, amount_units)?;

            let data = self
                .post_node(
                    request.network,
                    "/wallet/triggersmartcontract",
                    json!({
                        "owner_address": request.from_address,
                        "contract_address": contract,
                        "function_selector": "transfer(address,uint256)",
                        "parameter": parameter,
                        "fee_limit": TRC20_FEE_LIMIT_SUN,
                        "call_value": 0,
                        "visible": true,
                    }),
                )
                .await?;

            let transaction = data
                .get("transaction")
                .cloned()
                .ok_or_else(|| AgentError::Upstream("node response missing transaction".into()))?;

            Ok(UnsignedTransaction {
                transaction,
                metadata: TransferMetadata {
                    transfer_type: "TRC20_TRANSFER".to_string(),
                    token: request.token.to_uppercase(),
                    amount: request.amount,
                    recipient: request.to_address.clone(),
                    memo: None,
                    estimated_energy: TRC20_TRANSFER_ENERGY,
                    estimated_bandwidth: 350,
                    instructions: vec![
                        "Review the recipient address carefully".to_string(),
                        "Verify the amount and token contract".to_string(),
                        format!(
                            "You need ~{} Energy (~1.2 TRX if burning)",
                            TRC20_TRANSFER_ENERGY
                        ),
                        "Consider renting energy to save on fees".to_string(),
                        "Sign in your wallet and broadcast".to_string(),
                    ],
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_token() {
        assert_eq!(
            resolve_token_address("usdt", Network::Nile),
            "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf"
        );
        assert_eq!(
            resolve_token_address("USDT", Network::Mainnet),
            "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"
        );
    }

    #[test]
    fn test_resolve_falls_back_to_mainnet() {
        // BTT has no Nile entry; the mainnet contract is used.
        assert_eq!(
            resolve_token_address("BTT", Network::Nile),
            "TAFjULxiVgT4qWk6UZwjqwZXTSaGaqnVp4"
        );
    }

    #[test]
    fn test_resolve_passes_contract_through() {
        let contract = "TSSMHYeV2uE9qYH95DqyoCuNCzEL1NvU3S";
        assert_eq!(resolve_token_address(contract, Network::Nile), contract);
    }

    #[test]
    fn test_base58_decode_known_contract() {
        // The mainnet USDT contract and its documented hex form.
        let hex = base58_to_hex("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t").unwrap();
        assert_eq!(hex, "41a614f803b6fd780986a42c78ec9c7f77e6ded13c");
    }

    #[test]
    fn test_base58_decode_rejects_garbage() {
        assert!(base58_to_hex("not-an-address-0OIl").is_none());
        assert!(base58_to_hex("Tshort").is_none());
    }

    #[test]
    fn test_encode_transfer_params_layout() {
        let params =
            encode_transfer_params("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", 1_000_000).unwrap();
        assert_eq!(params.len(), 128);
        assert!(params.starts_with("000000000000000000000000a614f803"));
        assert!(params.ends_with("f4240"));
    }

    #[test]
    fn test_native_detection() {
        let req = TransferRequest {
            from_address: "Tfrom".into(),
            to_address: "Tto".into(),
            token: "trx".into(),
            amount: 1.0,
            memo: None,
            network: Network::Nile,
        };
        assert!(req.is_native());
    }
}

//! Transfer workflow integration tests: the full five-step chain against
//! scripted collaborators, covering the gating, degradation and
//! address-book semantics end to end.

use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;
use tron_copilot::chain::{ChainDirectory, Portfolio, SecurityInfo};
use tron_copilot::agent::pipeline::{Step, StepOutcome, TransferPipeline};
use tron_copilot::contacts::ContactStore;
use tron_copilot::risk::DenyListChecker;
use tron_copilot::tx::{TransactionBuilder, TransferMetadata, TransferRequest, UnsignedTransaction};
use tron_copilot::{AgentError, Network};

const RECIPIENT: &str = "TNPeeaaFB7K9cmo4uQpcU32zGK8G1NYqeL";
const SENDER: &str = "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf";

struct ScriptedChain {
    tags: Vec<String>,
    security: SecurityInfo,
}

#[async_trait]
impl ChainDirectory for ScriptedChain {
    async fn account_security(
        &self,
        _address: &str,
        _network: Network,
    ) -> Result<SecurityInfo, AgentError> {
        Ok(self.security.clone())
    }

    async fn account_tags(
        &self,
        _address: &str,
        _network: Network,
    ) -> Result<Vec<String>, AgentError> {
        Ok(self.tags.clone())
    }

    async fn wallet_portfolio(
        &self,
        _address: &str,
        _network: Network,
    ) -> Result<Portfolio, AgentError> {
        Ok(Portfolio::default())
    }
}

struct StubBuilder;

#[async_trait]
impl TransactionBuilder for StubBuilder {
    async fn build_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<UnsignedTransaction, AgentError> {
        let contract_type = if request.is_native() {
            "TransferContract"
        } else {
            "TriggerSmartContract"
        };
        Ok(UnsignedTransaction {
            transaction: serde_json::json!({
                "raw_data": {
                    "contract": [{"type": contract_type}]
                }
            }),
            metadata: TransferMetadata {
                transfer_type: "TRANSFER".to_string(),
                token: request.token.clone(),
                amount: request.amount,
                recipient: request.to_address.clone(),
                memo: request.memo.clone(),
                estimated_energy: if request.is_native() { 0 } else { 28_000 },
                estimated_bandwidth: 270,
                instructions: vec![],
            },
        })
    }
}

fn build_pipeline(dir: &TempDir, tags: Vec<String>) -> (Arc<ContactStore>, TransferPipeline) {
    let contacts = Arc::new(ContactStore::open(&dir.path().join("contacts.json")).unwrap());
    let chain = Arc::new(ScriptedChain {
        tags,
        security: SecurityInfo::default(),
    });
    let deny_list = Arc::new(DenyListChecker::new(chain.clone()));
    let pipeline = TransferPipeline::new(
        contacts.clone(),
        chain,
        deny_list,
        Arc::new(StubBuilder),
    );
    (contacts, pipeline)
}

fn transfer(token: &str, amount: f64, memo: Option<&str>) -> TransferRequest {
    TransferRequest {
        from_address: SENDER.to_string(),
        to_address: RECIPIENT.to_string(),
        token: token.to_string(),
        amount,
        memo: memo.map(|s| s.to_string()),
        network: Network::Mainnet,
    }
}

#[tokio::test]
async fn full_chain_runs_all_five_steps() {
    let dir = TempDir::new().unwrap();
    let (_, pipeline) = build_pipeline(&dir, vec![]);

    let report = pipeline
        .run(&transfer("USDT", 25.0, Some("Alice")), None)
        .await
        .unwrap();

    let order: Vec<Step> = report.steps.iter().map(|s| s.step).collect();
    assert_eq!(
        order,
        vec![
            Step::AddressBook,
            Step::DenyList,
            Step::RiskScore,
            Step::Energy,
            Step::Build
        ]
    );
    assert!(report.artifact.is_some());
}

#[tokio::test]
async fn malicious_recipient_yields_no_artifact() {
    let dir = TempDir::new().unwrap();
    let (_, pipeline) = build_pipeline(&dir, vec!["Phishing".to_string()]);

    let report = pipeline.run(&transfer("TRX", 5.0, None), None).await.unwrap();

    assert!(report.artifact.is_none());
    assert!(report.blocked());
    // Construction never ran.
    assert!(report.steps.iter().all(|s| s.step != Step::Build));
    // The gate fires after the advisory address-book step.
    assert_eq!(report.steps.len(), 2);
}

#[tokio::test]
async fn warning_tag_does_not_gate() {
    let dir = TempDir::new().unwrap();
    let (_, pipeline) = build_pipeline(&dir, vec!["Mixer".to_string()]);

    let report = pipeline.run(&transfer("TRX", 5.0, None), None).await.unwrap();

    assert!(report.artifact.is_some());
    let deny = report
        .steps
        .iter()
        .find(|s| s.step == Step::DenyList)
        .unwrap();
    assert!(matches!(deny.outcome, StepOutcome::Warning(_)));
}

#[tokio::test]
async fn contact_scenario_alias_then_repeat() {
    let dir = TempDir::new().unwrap();
    let (contacts, pipeline) = build_pipeline(&dir, vec![]);

    // Unseen destination with memo "Alice".
    pipeline
        .run(&transfer("TRX", 1.0, Some("Alice")), None)
        .await
        .unwrap();
    let record = contacts.get(RECIPIENT).unwrap();
    assert_eq!(record.alias.as_deref(), Some("Alice"));
    assert_eq!(record.transfer_count, 1);

    // Repeat transfer with no memo: alias preserved, count bumped.
    pipeline.run(&transfer("TRX", 2.0, None), None).await.unwrap();
    let record = contacts.get(RECIPIENT).unwrap();
    assert_eq!(record.alias.as_deref(), Some("Alice"));
    assert_eq!(record.transfer_count, 2);

    // Blocked transfers still record the contact first (advisory step
    // runs before the gate).
    let (contacts2, blocked_pipeline) = build_pipeline(&dir, vec!["Scam".to_string()]);
    blocked_pipeline
        .run(&transfer("TRX", 3.0, None), None)
        .await
        .unwrap();
    assert_eq!(contacts2.get(RECIPIENT).unwrap().transfer_count, 3);
}

#[tokio::test]
async fn validation_failures_abort_without_steps() {
    let dir = TempDir::new().unwrap();
    let (contacts, pipeline) = build_pipeline(&dir, vec![]);

    let mut bad_address = transfer("TRX", 1.0, None);
    bad_address.to_address = "Tshort".to_string();
    assert!(matches!(
        pipeline.run(&bad_address, None).await,
        Err(AgentError::Validation(_))
    ));

    let negative = transfer("TRX", -4.0, None);
    assert!(matches!(
        pipeline.run(&negative, None).await,
        Err(AgentError::Validation(_))
    ));

    // Nothing was recorded for either aborted run.
    assert!(contacts.is_empty());
}

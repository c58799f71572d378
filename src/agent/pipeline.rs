//! Transfer Validation Pipeline
//!
//! Fixed step sequence run for every transfer request:
//!
//! 1. address-book - record the recipient, look up the alias
//! 2. deny-list    - tag classification (the only hard gate)
//! 3. risk scoring - severity from security flags
//! 4. energy       - resource estimate, skipped for native TRX
//! 5. build        - unsigned transaction construction
//!
//! Steps 1-4 are advisory: a timeout or upstream failure degrades that
//! step to `unknown` and the run continues. Only a confirmed-malicious
//! verdict from the deny-list step aborts, and only the build step's own
//! failure propagates as a pipeline error.

use crate::config::{Network, ADVISORY_TIMEOUT, TRC20_TRANSFER_ENERGY};
use crate::contacts::ContactStore;
use crate::chain::ChainDirectory;
use crate::energy::{rental_proposal, EnergyAction};
use crate::error::AgentError;
use crate::risk::{self, DenyListChecker, DenyListStatus, RiskLevel};
use crate::tx::{TransactionBuilder, TransferRequest, UnsignedTransaction};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

/// The pipeline's steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AddressBook,
    DenyList,
    RiskScore,
    Energy,
    Build,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddressBook => "address-book",
            Self::DenyList => "deny-list",
            Self::RiskScore => "risk-score",
            Self::Energy => "energy",
            Self::Build => "build",
        }
    }
}

/// Outcome of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Passed,
    Warning(String),
    Blocked(String),
    Skipped(String),
    /// Advisory step degraded by a timeout or upstream failure.
    Unknown(String),
}

/// Status entry recorded for each executed step.
#[derive(Debug, Clone)]
pub struct StepStatus {
    pub step: Step,
    pub outcome: StepOutcome,
    pub detail: String,
}

/// Result of a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// Built artifact; `None` when the deny-list gate fired.
    pub artifact: Option<UnsignedTransaction>,
    pub steps: Vec<StepStatus>,
    pub recommendation: String,
}

impl PipelineReport {
    pub fn blocked(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.outcome, StepOutcome::Blocked(_)))
    }
}

/// Narration sink: each step pushes one short line as it completes.
pub type ProgressSink = mpsc::Sender<String>;

/// Per-run mutable context.
struct RunContext {
    network: Network,
    steps: Vec<StepStatus>,
    progress: Option<ProgressSink>,
}

impl RunContext {
    async fn record(&mut self, step: Step, outcome: StepOutcome, detail: impl Into<String>) {
        let detail = detail.into();
        info!("[{}] {}", step.as_str(), detail);
        if let Some(sink) = &self.progress {
            let _ = sink.send(format!("[{}] {}", step.as_str(), detail)).await;
        }
        self.steps.push(StepStatus {
            step,
            outcome,
            detail,
        });
    }
}

/// The gated multi-step workflow driver.
pub struct TransferPipeline {
    contacts: Arc<ContactStore>,
    chain: Arc<dyn ChainDirectory>,
    deny_list: Arc<DenyListChecker>,
    builder: Arc<dyn TransactionBuilder>,
}

impl TransferPipeline {
    pub fn new(
        contacts: Arc<ContactStore>,
        chain: Arc<dyn ChainDirectory>,
        deny_list: Arc<DenyListChecker>,
        builder: Arc<dyn TransactionBuilder>,
    ) -> Self {
        Self {
            contacts,
            chain,
            deny_list,
            builder,
        }
    }

    /// Run the workflow for one transfer.
    ///
    /// Validation failures and build failures return `Err`; a deny-list
    /// block returns `Ok` with `artifact = None` and the block reason.
    pub async fn run(
        &self,
        request: &TransferRequest,
        progress: Option<ProgressSink>,
    ) -> Result<PipelineReport, AgentError> {
        // Input validation happens before any step runs.
        if !risk::is_valid_address(&request.to_address) {
            return Err(AgentError::Validation(format!(
                "Invalid recipient address: {}",
                request.to_address
            )));
        }
        if !(request.amount > 0.0) {
            return Err(AgentError::Validation(
                "Amount must be greater than 0".to_string(),
            ));
        }

        let mut ctx = RunContext {
            network: request.network,
            steps: Vec::new(),
            progress,
        };

        self.step_address_book(request, &mut ctx).await;

        if let Some(reason) = self.step_deny_list(request, &mut ctx).await {
            // Hard stop: remaining steps are skipped, no artifact.
            return Ok(PipelineReport {
                artifact: None,
                steps: ctx.steps,
                recommendation: format!("Transfer blocked: {}", reason),
            });
        }

        self.step_risk_score(request, &mut ctx).await;
        self.step_energy(request, &mut ctx).await;

        let artifact = self.step_build(request, &mut ctx).await?;
        let recommendation = summarize(&ctx.steps);

        Ok(PipelineReport {
            artifact: Some(artifact),
            steps: ctx.steps,
            recommendation,
        })
    }

    /// Step 1: record the transfer in the address book. Purely advisory.
    async fn step_address_book(&self, request: &TransferRequest, ctx: &mut RunContext) {
        let result = self
            .contacts
            .record_transfer(&request.to_address, request.memo.as_deref());

        match result {
            Ok(record) => {
                let detail = match &record.alias {
                    Some(alias) => format!(
                        "Sending to contact '{}' (transfer #{})",
                        alias, record.transfer_count
                    ),
                    None => format!(
                        "New recipient recorded (transfer #{})",
                        record.transfer_count
                    ),
                };
                ctx.record(Step::AddressBook, StepOutcome::Passed, detail).await;
            }
            Err(e) => {
                warn!("Address book recording failed: {:#}", e);
                ctx.record(
                    Step::AddressBook,
                    StepOutcome::Unknown(e.to_string()),
                    "Address book unavailable",
                )
                .await;
            }
        }
    }

    /// Step 2: deny-list check. The only step that can abort the run;
    /// returns the block reason when it does.
    async fn step_deny_list(
        &self,
        request: &TransferRequest,
        ctx: &mut RunContext,
    ) -> Option<String> {
        let report = self
            .deny_list
            .check(&request.to_address, ctx.network)
            .await;

        match report.status {
            DenyListStatus::ConfirmedMalicious => {
                let reason = report
                    .warnings
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "recipient is flagged as malicious".to_string());
                ctx.record(Step::DenyList, StepOutcome::Blocked(reason.clone()), reason.clone())
                    .await;
                Some(reason)
            }
            DenyListStatus::Warning => {
                let warning = report
                    .warnings
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "recipient carries caution tags".to_string());
                ctx.record(Step::DenyList, StepOutcome::Warning(warning.clone()), warning.clone())
                    .await;
                None
            }
            DenyListStatus::Safe => {
                ctx.record(Step::DenyList, StepOutcome::Passed, "No malicious tags found")
                    .await;
                None
            }
            DenyListStatus::Unknown => {
                ctx.record(
                    Step::DenyList,
                    StepOutcome::Unknown(report.source.clone()),
                    "Tag database unavailable",
                )
                .await;
                None
            }
        }
    }

    /// Step 3: risk scoring. Advisory regardless of severity.
    async fn step_risk_score(&self, request: &TransferRequest, ctx: &mut RunContext) {
        let security = timeout(
            ADVISORY_TIMEOUT,
            self.chain.account_security(&request.to_address, ctx.network),
        )
        .await;

        match security {
            Ok(Ok(info)) => {
                let report = risk::assess_security(&info);
                let detail = format!("Risk level {}", report.level.as_str());
                let outcome = match report.level {
                    RiskLevel::Safe | RiskLevel::Low => StepOutcome::Passed,
                    level => StepOutcome::Warning(format!(
                        "{}: {}",
                        level.as_str(),
                        report.warnings.join("; ")
                    )),
                };
                ctx.record(Step::RiskScore, outcome, detail).await;
            }
            Ok(Err(e)) => {
                ctx.record(
                    Step::RiskScore,
                    StepOutcome::Unknown(e.to_string()),
                    "Security assessment unavailable",
                )
                .await;
            }
            Err(_) => {
                ctx.record(
                    Step::RiskScore,
                    StepOutcome::Unknown("timeout".to_string()),
                    "Security assessment timed out",
                )
                .await;
            }
        }
    }

    /// Step 4: energy estimation. Skipped entirely for native transfers.
    async fn step_energy(&self, request: &TransferRequest, ctx: &mut RunContext) {
        if request.is_native() {
            ctx.record(
                Step::Energy,
                StepOutcome::Skipped("native transfer".to_string()),
                "TRX transfer needs bandwidth only, no energy",
            )
            .await;
            return;
        }

        let proposal = rental_proposal(TRC20_TRANSFER_ENERGY, 1);
        let detail = match proposal.action {
            EnergyAction::Rent => {
                let best = &proposal.rental_options[0];
                format!(
                    "~{} energy needed; renting from {} costs {:.2} TRX (save {:.0}%)",
                    proposal.energy_needed, best.platform, best.cost_trx, best.savings_percent
                )
            }
            EnergyAction::Burn => format!(
                "~{} energy needed; burning ~{:.2} TRX is the cheapest option",
                proposal.energy_needed, proposal.burn_cost_trx
            ),
        };
        ctx.record(Step::Energy, StepOutcome::Passed, detail).await;
    }

    /// Step 5: construction. The only step whose failure is a pipeline
    /// failure.
    async fn step_build(
        &self,
        request: &TransferRequest,
        ctx: &mut RunContext,
    ) -> Result<UnsignedTransaction, AgentError> {
        match self.builder.build_transfer(request).await {
            Ok(artifact) => {
                ctx.record(
                    Step::Build,
                    StepOutcome::Passed,
                    "Unsigned transaction ready for signing",
                )
                .await;
                Ok(artifact)
            }
            Err(e) => {
                ctx.record(
                    Step::Build,
                    StepOutcome::Unknown(e.to_string()),
                    "Transaction construction failed",
                )
                .await;
                Err(e)
            }
        }
    }
}

/// Single overall recommendation derived from the step statuses.
fn summarize(steps: &[StepStatus]) -> String {
    let warnings: Vec<&str> = steps
        .iter()
        .filter_map(|s| match &s.outcome {
            StepOutcome::Warning(w) => Some(w.as_str()),
            _ => None,
        })
        .collect();
    let unknowns = steps
        .iter()
        .filter(|s| matches!(s.outcome, StepOutcome::Unknown(_)))
        .count();

    if !warnings.is_empty() {
        format!(
            "Proceed with caution and verify the recipient: {}",
            warnings.join("; ")
        )
    } else if unknowns > 0 {
        format!(
            "{} advisory check(s) could not run; verify the recipient before signing",
            unknowns
        )
    } else {
        "All checks passed; review and sign the transaction".to_string()
    }
}

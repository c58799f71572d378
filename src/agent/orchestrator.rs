//! Chat Orchestrator
//!
//! Drives one agent turn: streamed completion with tool declarations,
//! tool-call reconstruction, dispatch (builtins, the transfer pipeline,
//! dynamic skills through the self-healing executor), then a second
//! completion over the tool results. Responses are streamed to the
//! caller as plain-text chunks with light pacing.

use crate::agent::accumulator::{CompletedToolCall, ToolCallAccumulator};
use crate::agent::executor::{LlmRepairer, SelfHealingExecutor};
use crate::agent::pipeline::TransferPipeline;
use crate::chain::{ChainDirectory, HttpChainDirectory};
use crate::config::{Config, Network, HISTORY_CONTEXT_TURNS, TRC20_TRANSFER_ENERGY};
use crate::contacts::{ContactSort, ContactStore};
use crate::conversation::{is_reset_command, ConversationLog};
use crate::energy::rental_proposal;
use crate::error::AgentError;
use crate::llm::{ChatClient, ChatMessage, WireFunction, WireToolCall};
use crate::risk::{self, DenyListChecker, DenyListStatus};
use crate::skills::{SkillGenerator, SkillLoader, SkillRegistry};
use crate::tools;
use crate::tx::{HttpTransactionBuilder, TransactionBuilder, TransferRequest};
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Pause between forwarded narration chunks.
const PACING_DELAY: Duration = Duration::from_millis(5);

/// One inbound chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

/// The agent engine shared across inbound requests.
pub struct Agent {
    config: Arc<Config>,
    llm: Arc<ChatClient>,
    history: Arc<ConversationLog>,
    contacts: Arc<ContactStore>,
    chain: Arc<dyn ChainDirectory>,
    deny_list: Arc<DenyListChecker>,
    registry: Arc<SkillRegistry>,
    executor: Arc<SelfHealingExecutor>,
    generator: SkillGenerator,
    pipeline: TransferPipeline,
}

impl Agent {
    /// Wire the agent with explicit collaborators (tests stub these).
    pub fn new(
        config: Arc<Config>,
        llm: Arc<ChatClient>,
        chain: Arc<dyn ChainDirectory>,
        builder: Arc<dyn TransactionBuilder>,
    ) -> Result<Self> {
        let history = Arc::new(ConversationLog::new());
        let contacts = Arc::new(ContactStore::open(&config.contacts_path)?);
        let deny_list = Arc::new(DenyListChecker::new(chain.clone()));
        let registry = Arc::new(SkillRegistry::new(
            &config.skills_dir,
            &config.personal_skills_dir,
        ));
        registry.discover();

        let loader = Arc::new(SkillLoader::new(llm.clone()));
        let executor = Arc::new(SelfHealingExecutor::new(
            loader,
            Arc::new(LlmRepairer::new(llm.clone())),
        ));
        let generator = SkillGenerator::new(&config.personal_skills_dir);
        let pipeline = TransferPipeline::new(
            contacts.clone(),
            chain.clone(),
            deny_list.clone(),
            builder,
        );

        Ok(Self {
            config,
            llm,
            history,
            contacts,
            chain,
            deny_list,
            registry,
            executor,
            generator,
            pipeline,
        })
    }

    /// Wire the agent with the HTTP collaborators.
    pub fn from_config(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let llm = Arc::new(ChatClient::from_config(&config));
        let chain: Arc<dyn ChainDirectory> = Arc::new(HttpChainDirectory::new(&config));
        let builder: Arc<dyn TransactionBuilder> =
            Arc::new(HttpTransactionBuilder::new(&config));
        Self::new(config, llm, chain, builder)
    }

    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    /// Handle one chat request, streaming the reply.
    pub fn handle_message(self: &Arc<Self>, request: ChatRequest) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(64);
        let agent = self.clone();
        let turn_id = uuid::Uuid::new_v4();

        tokio::spawn(async move {
            info!("Turn {} started: {:?}", turn_id, request.message.chars().take(60).collect::<String>());
            if let Err(e) = agent.run_turn(&request, &tx).await {
                error!("Turn {} failed: {:#}", turn_id, e);
                let _ = tx.send(format!("Error: {:#}", e)).await;
            }
        });

        rx
    }

    async fn run_turn(&self, request: &ChatRequest, tx: &mpsc::Sender<String>) -> Result<()> {
        if is_reset_command(&request.message) {
            self.history.clear();
            let _ = tx.send("Memory cleared. Context reset.".to_string()).await;
            return Ok(());
        }

        if !self.llm.is_available() {
            let _ = tx
                .send("AI service unavailable. Please check your API key configuration.".to_string())
                .await;
            return Ok(());
        }

        let network = request
            .network
            .as_deref()
            .map(Network::parse)
            .unwrap_or(self.config.default_network);

        // Re-discover so a skill generated in the previous turn is
        // already callable in this one.
        self.registry.discover();
        let mut tool_defs = tools::builtin_tool_definitions();
        tool_defs.extend(self.registry.tool_definitions());

        let mut messages = vec![ChatMessage::system(&self.system_prompt(request))];
        messages.extend(self.history.recent(HISTORY_CONTEXT_TURNS));
        messages.push(ChatMessage::user(&request.message));

        // First completion: may answer directly or request tool calls.
        let mut stream = self.llm.stream_chat(&messages, &tool_defs).await?;
        let mut accumulator = ToolCallAccumulator::new();
        let mut forwarded = 0usize;

        while let Some(delta) = stream.recv().await {
            accumulator.push(&delta);
            if accumulator.no_calls_seen() {
                let text = accumulator.text();
                if text.len() > forwarded {
                    let _ = tx.send(text[forwarded..].to_string()).await;
                    forwarded = text.len();
                    tokio::time::sleep(PACING_DELAY).await;
                }
            }
        }

        let (content, calls) = accumulator.finish();

        if calls.is_empty() {
            self.history.push(ChatMessage::user(&request.message));
            self.history.push(ChatMessage::assistant(&content));
            return Ok(());
        }

        info!("Model requested {} tool call(s)", calls.len());
        let _ = tx.send("\n\nExecuting skills:\n".to_string()).await;

        // The assistant turn carrying the calls must precede the tool
        // results in the message history.
        let wire_calls: Vec<WireToolCall> = calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                call_type: "function".to_string(),
                function: WireFunction {
                    name: call.name.clone(),
                    arguments: call.raw_arguments.clone(),
                },
            })
            .collect();
        let assistant_msg = ChatMessage {
            role: "assistant".to_string(),
            content: if content.is_empty() {
                None
            } else {
                Some(content.clone())
            },
            tool_calls: Some(wire_calls),
            tool_call_id: None,
        };
        messages.push(assistant_msg.clone());

        let mut tool_messages = Vec::new();
        for call in &calls {
            let _ = tx.send(format!("- {}\n", call.name)).await;
            let result = self.dispatch(call, request, network, tx).await;
            let message = ChatMessage::tool_result(&call.id, &result);
            messages.push(message.clone());
            tool_messages.push(message);
            tokio::time::sleep(PACING_DELAY).await;
        }

        // Second completion turns the tool results into prose.
        let _ = tx.send("\n".to_string()).await;
        let mut stream = self.llm.stream_chat(&messages, &[]).await?;
        let mut final_text = String::new();
        while let Some(delta) = stream.recv().await {
            if let Some(chunk) = delta.content {
                final_text.push_str(&chunk);
                let _ = tx.send(chunk).await;
                tokio::time::sleep(PACING_DELAY).await;
            }
        }

        self.history.push(ChatMessage::user(&request.message));
        self.history.push(assistant_msg);
        for message in tool_messages {
            self.history.push(message);
        }
        self.history.push(ChatMessage::assistant(&final_text));

        Ok(())
    }

    fn system_prompt(&self, request: &ChatRequest) -> String {
        let wallet = request
            .wallet_address
            .as_deref()
            .unwrap_or("Not connected");
        format!(
            "You are TRON Copilot, an expert AI assistant for the TRON blockchain.\n\
             Connected user wallet: {wallet}\n\n\
             Help users manage assets, check prices, and stay safe. Use the \
             available tools to answer questions.\n\n\
             Rules:\n\
             - For transfers, call `transfer_tokens`; it runs the full \
               address-book, deny-list, risk, energy and build chain.\n\
             - When the user asks for functionality no tool covers, call \
               `generate_skill` instead of improvising.\n\
             - 'u' or 'U' as a token name means USDT.\n\
             - Reply in the user's language. If you don't know, say so."
        )
    }

    /// Execute one reconstructed tool call and render its result for the
    /// model.
    async fn dispatch(
        &self,
        call: &CompletedToolCall,
        request: &ChatRequest,
        network: Network,
        tx: &mpsc::Sender<String>,
    ) -> String {
        if call.parse_error {
            return format!(
                "Error: tool call '{}' carried malformed arguments and was not executed",
                call.name
            );
        }

        let args = &call.arguments;
        let str_arg = |key: &str| args.get(key).and_then(|v| v.as_str()).map(|s| s.trim().to_string());
        let wallet = request.wallet_address.as_deref();

        match call.name.as_str() {
            "get_wallet_balance" => {
                let Some(address) = str_arg("address").or_else(|| wallet.map(String::from)) else {
                    return "Error: no wallet address provided and user is not connected".into();
                };
                match self.chain.wallet_portfolio(&address, network).await {
                    Ok(portfolio) => {
                        let mut out = format!(
                            "Wallet portfolio for {}\nTotal value: ${:.2} USD\n",
                            address, portfolio.total_value_usd
                        );
                        for token in portfolio.tokens.iter().take(10) {
                            out.push_str(&format!(
                                "  {:.2} {} (${:.2})\n",
                                token.amount, token.symbol, token.value_usd
                            ));
                        }
                        out
                    }
                    Err(e) => format!("Error: {}", e),
                }
            }

            "check_address_security" => {
                let Some(address) = str_arg("address") else {
                    return "Error: no address provided for check".into();
                };
                if !risk::is_valid_address(&address) {
                    return format!("Error: invalid address format: {}", address);
                }
                match self.chain.account_security(&address, network).await {
                    Ok(info) => {
                        let report = risk::assess_security(&info);
                        let mut out = format!(
                            "Security check for {}\nRisk level: {}\n",
                            address,
                            report.level.as_str()
                        );
                        for warning in &report.warnings {
                            out.push_str(&format!("  - {}\n", warning));
                        }
                        out.push_str(&report.recommendation);
                        out
                    }
                    Err(e) => format!("Security check unavailable: {}", e),
                }
            }

            "record_transfer" => {
                let Some(to_address) = str_arg("to_address") else {
                    return "Error: no recipient address provided".into();
                };
                match self.contacts.record_transfer(&to_address, None) {
                    Ok(record) => match record.alias {
                        Some(alias) => format!(
                            "Known contact '{}', transfer #{}",
                            alias, record.transfer_count
                        ),
                        None => format!(
                            "New address recorded in address book (transfer #{})",
                            record.transfer_count
                        ),
                    },
                    Err(e) => format!("Address book unavailable: {}", e),
                }
            }

            "check_malicious" => {
                let Some(address) = str_arg("address") else {
                    return "Error: no address provided".into();
                };
                let report = self.deny_list.check(&address, network).await;
                match report.status {
                    DenyListStatus::ConfirmedMalicious => format!(
                        "DANGER: address is flagged as malicious ({}). Strongly recommend cancelling this transfer.",
                        report.warnings.join("; ")
                    ),
                    DenyListStatus::Warning => {
                        format!("Caution: {}", report.warnings.join("; "))
                    }
                    DenyListStatus::Safe => {
                        "No malicious tags found (source: TronScan)".to_string()
                    }
                    DenyListStatus::Unknown => {
                        format!("Could not verify: {}", report.warnings.join("; "))
                    }
                }
            }

            "calculate_energy" => {
                let token = str_arg("token").unwrap_or_else(|| "TRX".to_string());
                if token.eq_ignore_ascii_case("TRX") {
                    "TRX transfers need bandwidth only (~270), no energy rental required"
                        .to_string()
                } else {
                    let proposal = rental_proposal(TRC20_TRANSFER_ENERGY, 1);
                    format!(
                        "{} transfer needs ~{} energy. Burn cost {:.2} TRX. Recommendation: {:?} - {}",
                        token.to_uppercase(),
                        proposal.energy_needed,
                        proposal.burn_cost_trx,
                        proposal.action,
                        proposal.reason
                    )
                }
            }

            "build_transfer" | "transfer_tokens" => {
                self.run_transfer(call, request, network, tx).await
            }

            "analyze_error" => {
                let Some(error_message) = str_arg("error_message") else {
                    return "Error: no error message provided".into();
                };
                self.analyze_error(&error_message).await
            }

            "list_contacts" => {
                let sort = ContactSort::parse(&str_arg("sort_by").unwrap_or_default());
                let contacts = self.contacts.list(sort);
                if contacts.is_empty() {
                    return "Address book is empty. Contacts are added automatically when you transfer with a memo.".into();
                }
                let mut out = format!("Address book ({} contacts):\n", contacts.len());
                for entry in contacts.iter().take(20) {
                    let alias = entry.record.alias.as_deref().unwrap_or("(no alias)");
                    out.push_str(&format!(
                        "  {} {} - {} transfers\n",
                        alias, entry.address, entry.record.transfer_count
                    ));
                }
                out
            }

            "search_contacts" => {
                let Some(query) = str_arg("query") else {
                    return "Error: no search query provided".into();
                };
                let found = self.contacts.search(&query);
                if found.is_empty() {
                    return format!("No contacts found matching '{}'", query);
                }
                found
                    .iter()
                    .map(|e| {
                        format!(
                            "{} {} ({} transfers)",
                            e.record.alias.as_deref().unwrap_or("(no alias)"),
                            e.address,
                            e.record.transfer_count
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }

            "generate_skill" => {
                let Some(requirement) = str_arg("requirement") else {
                    return "Error: no requirement provided".into();
                };
                let skill_name = str_arg("skill_name");
                match self.generator.generate(&requirement, skill_name.as_deref()) {
                    Ok(persisted) => {
                        // Make it resolvable immediately.
                        self.registry.discover();
                        format!(
                            "New skill '{}' generated and deployed to {}. Ask me to run it to try it out.",
                            persisted.name,
                            persisted.skill_dir.display()
                        )
                    }
                    Err(e) => format!("Skill generation failed: {:#}", e),
                }
            }

            "manage_skill" => {
                let Some(skill_name) = str_arg("skill_name") else {
                    return "Error: no skill name provided".into();
                };
                match str_arg("action").as_deref() {
                    Some("delete") => match self.registry.delete_personal(&skill_name) {
                        Ok(true) => format!("Skill '{}' deleted.", skill_name),
                        Ok(false) => format!("Skill '{}' does not exist.", skill_name),
                        Err(e) => format!("Failed to delete skill '{}': {}", skill_name, e),
                    },
                    Some("save") => {
                        if self.registry.get(&skill_name).is_some() {
                            format!("Skill '{}' confirmed saved to the personal library.", skill_name)
                        } else {
                            format!("Skill '{}' does not exist, nothing to save.", skill_name)
                        }
                    }
                    _ => "Error: action must be 'save' or 'delete'".into(),
                }
            }

            // Anything else resolves through the registry as a dynamic
            // skill, invoked with the self-healing retry budget.
            name => match self.registry.get(name) {
                Some(descriptor) => {
                    let outcome = self
                        .executor
                        .execute(&descriptor, call.arguments_value())
                        .await;
                    if outcome.success {
                        let mut out = outcome
                            .message
                            .unwrap_or_else(|| "Skill executed successfully".to_string());
                        if let Some(payload) = outcome.payload {
                            out.push_str(&format!("\n{}", payload));
                        }
                        out
                    } else {
                        format!(
                            "Error executing skill '{}': {}",
                            name,
                            outcome.error_text()
                        )
                    }
                }
                None => format!("Error: unknown tool '{}'", name),
            },
        }
    }

    /// Run the transfer pipeline, narrating step lines to the caller.
    async fn run_transfer(
        &self,
        call: &CompletedToolCall,
        request: &ChatRequest,
        network: Network,
        tx: &mpsc::Sender<String>,
    ) -> String {
        let Some(wallet) = request.wallet_address.as_deref() else {
            return "Please connect your wallet first to perform transfers".into();
        };

        let args = &call.arguments;
        let Some(to_address) = args.get("to_address").and_then(|v| v.as_str()) else {
            return "Error: no recipient address provided".into();
        };
        let amount = args.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let mut token = args
            .get("token")
            .and_then(|v| v.as_str())
            .unwrap_or("TRX")
            .trim()
            .to_string();
        if token.eq_ignore_ascii_case("u") {
            token = "USDT".to_string();
        }
        let memo = args
            .get("memo")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let transfer = TransferRequest {
            from_address: wallet.to_string(),
            to_address: to_address.trim().to_string(),
            token,
            amount,
            memo,
            network,
        };

        // Forward pipeline narration lines into the response stream.
        let (progress_tx, mut progress_rx) = mpsc::channel(16);
        let forward_tx = tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(line) = progress_rx.recv().await {
                let _ = forward_tx.send(format!("  {}\n", line)).await;
                tokio::time::sleep(PACING_DELAY).await;
            }
        });

        let result = self.pipeline.run(&transfer, Some(progress_tx)).await;
        let _ = forwarder.await;

        match result {
            Ok(report) => match report.artifact {
                Some(artifact) => {
                    let tx_json = serde_json::to_string(&artifact.transaction)
                        .unwrap_or_else(|_| "{}".to_string());
                    format!(
                        "Transfer checks complete. {}\n\
                         Type: {} | Token: {} | Amount: {} | Recipient: {}\n\
                         Estimated energy: {} | bandwidth: {}\n\n\
                         <<<JSON\n{}\nJSON>>>\n\n\
                         Please confirm and sign the transaction in the card below.",
                        report.recommendation,
                        artifact.metadata.transfer_type,
                        artifact.metadata.token,
                        artifact.metadata.amount,
                        artifact.metadata.recipient,
                        artifact.metadata.estimated_energy,
                        artifact.metadata.estimated_bandwidth,
                        tx_json
                    )
                }
                None => format!(
                    "TRANSACTION BLOCKED FOR SECURITY\n{}\nThe transfer was not built to protect your funds.",
                    report.recommendation
                ),
            },
            Err(AgentError::Validation(msg)) => format!("Error: {}", msg),
            Err(e) => format!("Transfer failed: {}", e),
        }
    }

    /// Short LLM-backed explanation of a chain error.
    async fn analyze_error(&self, error_message: &str) -> String {
        let prompt = format!(
            "You are a TRON expert. A user's transaction failed with this \
             error:\n\n{}\n\nIn under 100 words, state the likely cause (two \
             candidates) and two concrete fixes. Known patterns: 'balance \
             not sufficient' means not enough TRX; 'Contract validate' \
             means insufficient energy/bandwidth; 'account not found' means \
             the account is not activated.",
            error_message
        );
        match self.llm.complete(&[ChatMessage::user(&prompt)]).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Error analysis failed: {:#}", e);
                format!(
                    "Could not analyze the error ({}). Check your balance and network, then retry.",
                    e
                )
            }
        }
    }
}

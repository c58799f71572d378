//! TRON Copilot
//!
//! Self-evolving AI agent backend for the TRON blockchain. Natural
//! language requests become chained, validated actions; missing
//! functionality is synthesized as new skills at runtime.
//!
//! # Architecture
//!
//! ```text
//! Chat request ──► Orchestrator ──► Completion service (streamed)
//!                      │
//!                      ├── Accumulator  (tool-call reconstruction)
//!                      ├── Registry     (system + personal skill tiers)
//!                      ├── Executor     (self-healing retry for skills)
//!                      ├── Pipeline     (gated transfer validation)
//!                      └── Generator    (requirement → skill artifact)
//! ```

pub mod agent;
pub mod chain;
pub mod config;
pub mod contacts;
pub mod conversation;
pub mod energy;
pub mod error;
pub mod llm;
pub mod risk;
pub mod skills;
pub mod tools;
pub mod tx;

pub use agent::{Agent, ChatRequest, SelfHealingExecutor, ToolCallAccumulator, TransferPipeline};
pub use chain::{ChainDirectory, HttpChainDirectory, SecurityInfo};
pub use config::{Config, Network};
pub use contacts::{ContactRecord, ContactStore};
pub use conversation::ConversationLog;
pub use error::AgentError;
pub use llm::{ChatClient, ChatMessage, StreamDelta};
pub use risk::{DenyListChecker, DenyListStatus, RiskLevel};
pub use skills::{SkillGenerator, SkillLoader, SkillOutcome, SkillRegistry};
pub use tx::{HttpTransactionBuilder, TransactionBuilder, TransferRequest, UnsignedTransaction};

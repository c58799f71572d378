//! Agent Core
//!
//! The orchestration engine: streamed tool-call reconstruction, the
//! self-healing executor for dynamic skills, the gated transfer
//! validation pipeline, and the chat loop tying them to the completion
//! service.

pub mod accumulator;
pub mod executor;
pub mod orchestrator;
pub mod pipeline;

pub use accumulator::{CompletedToolCall, ToolCallAccumulator};
pub use executor::{LlmRepairer, SelfHealingExecutor, SourceRepairer};
pub use orchestrator::{Agent, ChatRequest};
pub use pipeline::{PipelineReport, Step, StepOutcome, StepStatus, TransferPipeline};

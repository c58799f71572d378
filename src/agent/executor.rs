//! Self-Healing Executor
//!
//! Wraps invocation of a dynamically loaded skill with exactly one
//! repair-and-retry budget. A failing invocation hands the skill's
//! current source and error text to a generative repair collaborator;
//! the pre-repair source is backed up with a timestamp suffix before the
//! replacement is written, and the retry goes back through the loader so
//! the fresh implementation is picked up. When the retry also fails, the
//! original error is surfaced verbatim.

use crate::llm::{ChatClient, ChatMessage};
use crate::skills::registry::SkillDescriptor;
use crate::skills::runtime::{SkillLoader, SkillOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Retry budget per invocation.
const MAX_REPAIR_ATTEMPTS: u32 = 1;

/// States of one self-healing invocation. `Done` and `GaveUp` are
/// terminal; `GaveUp` carries the original error so it can be surfaced
/// verbatim.
#[derive(Debug)]
enum ExecutionPhase {
    Attempt,
    Repairing { error: String },
    Retry { original_error: String },
    Done(SkillOutcome),
    GaveUp { original_error: String },
}

/// Narrow interface to the generative repair collaborator: given the
/// failing skill, the error and the current source, return a complete
/// replacement source.
#[async_trait]
pub trait SourceRepairer: Send + Sync {
    async fn repair(&self, skill_name: &str, error: &str, source: &str) -> Result<String>;
}

/// Completion-service backed repairer.
pub struct LlmRepairer {
    client: Arc<ChatClient>,
}

impl LlmRepairer {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceRepairer for LlmRepairer {
    async fn repair(&self, skill_name: &str, error: &str, source: &str) -> Result<String> {
        let prompt = format!(
            "The following skill definition failed during execution.\n\n\
             Skill: {skill_name}\n\
             Error: {error}\n\n\
             Definition (TOML):\n```toml\n{source}\n```\n\n\
             Rewrite the COMPLETE definition so it no longer fails while \
             keeping the original functionality. Return ONLY the TOML in a \
             ```toml code block."
        );
        let messages = [
            ChatMessage::system("You are a precise assistant. Return only code."),
            ChatMessage::user(&prompt),
        ];

        let reply = self.client.complete(&messages).await?;
        extract_source(&reply).context("repair reply contained no usable source")
    }
}

/// Pull the replacement source out of a model reply: a fenced code block
/// when present, otherwise the raw reply if it parses structurally.
pub fn extract_source(reply: &str) -> Option<String> {
    for fence in ["```toml", "```"] {
        if let Some(start) = reply.find(fence) {
            let after = &reply[start + fence.len()..];
            if let Some(end) = after.find("```") {
                let block = after[..end].trim();
                if !block.is_empty() {
                    return Some(block.to_string());
                }
            }
        }
    }
    let trimmed = reply.trim();
    if !trimmed.is_empty() && toml::from_str::<toml::Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }
    None
}

/// Executor driving the attempt/repair/retry state machine.
pub struct SelfHealingExecutor {
    loader: Arc<SkillLoader>,
    repairer: Arc<dyn SourceRepairer>,
}

impl SelfHealingExecutor {
    pub fn new(loader: Arc<SkillLoader>, repairer: Arc<dyn SourceRepairer>) -> Self {
        Self { loader, repairer }
    }

    /// Invoke a dynamic skill with the single-repair budget.
    pub async fn execute(&self, descriptor: &SkillDescriptor, params: Value) -> SkillOutcome {
        let mut phase = ExecutionPhase::Attempt;
        let mut attempts = 0u32;

        loop {
            phase = match phase {
                ExecutionPhase::Attempt => {
                    attempts += 1;
                    let outcome = self
                        .loader
                        .invoke(&descriptor.name, &descriptor.dir, params.clone())
                        .await;

                    if outcome.success {
                        ExecutionPhase::Done(outcome)
                    } else {
                        // A structured failure counts the same as a
                        // raised error for retry purposes.
                        let error = outcome.error_text();
                        warn!("Skill '{}' failed: {}", descriptor.name, error);
                        ExecutionPhase::Repairing { error }
                    }
                }

                ExecutionPhase::Repairing { error } => {
                    if attempts > MAX_REPAIR_ATTEMPTS {
                        ExecutionPhase::GaveUp {
                            original_error: error,
                        }
                    } else {
                        match self.attempt_repair(descriptor, &error).await {
                            Ok(()) => ExecutionPhase::Retry {
                                original_error: error,
                            },
                            Err(e) => {
                                warn!("Skill '{}' repair failed: {:#}", descriptor.name, e);
                                ExecutionPhase::GaveUp {
                                    original_error: error,
                                }
                            }
                        }
                    }
                }

                ExecutionPhase::Retry { original_error } => {
                    attempts += 1;
                    let outcome = self
                        .loader
                        .invoke(&descriptor.name, &descriptor.dir, params.clone())
                        .await;

                    if outcome.success {
                        info!("Skill '{}' recovered after repair", descriptor.name);
                        ExecutionPhase::Done(outcome)
                    } else {
                        warn!(
                            "Skill '{}' retry failed: {}",
                            descriptor.name,
                            outcome.error_text()
                        );
                        // Back to Repairing, where the budget check ends
                        // the run once the single retry is spent.
                        ExecutionPhase::Repairing {
                            error: original_error,
                        }
                    }
                }

                ExecutionPhase::Done(outcome) => return outcome,

                // Surface the first error verbatim, not the retry's.
                ExecutionPhase::GaveUp { original_error } => {
                    return SkillOutcome::failure(original_error)
                }
            };
        }
    }

    /// One repair cycle: fetch source, ask the collaborator for a
    /// replacement, back up, persist.
    async fn attempt_repair(&self, descriptor: &SkillDescriptor, error: &str) -> Result<()> {
        info!("Attempting repair of skill '{}'", descriptor.name);

        let source = self.loader.implementation_source(&descriptor.dir)?;
        let replacement = self
            .repairer
            .repair(&descriptor.name, error, &source)
            .await?;

        // Keep the pre-repair source recoverable; backups are never
        // auto-deleted.
        let backup_path = descriptor.dir.join(format!(
            "skill.toml.bak_{}",
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        std::fs::write(&backup_path, &source)
            .with_context(|| format!("failed to write backup {}", backup_path.display()))?;
        info!("Backed up '{}' to {}", descriptor.name, backup_path.display());

        self.loader
            .write_implementation(&descriptor.name, &descriptor.dir, &replacement)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::registry::SkillTier;
    use crate::skills::runtime::PromptBackend;
    use parking_lot::Mutex;
    use std::path::Path;
    use tempfile::TempDir;

    /// Prompt backend that fails while the template contains "BROKEN".
    struct FlakyBackend;

    #[async_trait]
    impl PromptBackend for FlakyBackend {
        async fn complete_prompt(&self, prompt: &str) -> Result<String> {
            if prompt.contains("BROKEN") {
                anyhow::bail!("template exploded")
            }
            Ok("fixed output".to_string())
        }
    }

    /// Repairer returning a canned replacement (optionally fenced).
    struct CannedRepairer {
        replacement: Option<String>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl SourceRepairer for CannedRepairer {
        async fn repair(&self, _skill: &str, _error: &str, _source: &str) -> Result<String> {
            *self.calls.lock() += 1;
            self.replacement
                .clone()
                .context("no replacement available")
        }
    }

    const BROKEN_SKILL: &str = "[execution]\ntype = \"prompt\"\nprompt = \"BROKEN {{x}}\"\n";
    const FIXED_SKILL: &str = "[execution]\ntype = \"prompt\"\nprompt = \"ok {{x}}\"\n";

    fn descriptor(dir: &Path) -> SkillDescriptor {
        SkillDescriptor {
            name: "flaky".to_string(),
            description: "test".to_string(),
            tier: SkillTier::Personal,
            generated: true,
            dir: dir.to_path_buf(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    fn setup(replacement: Option<String>) -> (TempDir, SelfHealingExecutor, SkillDescriptor) {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("flaky");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(skill_dir.join("skill.toml"), BROKEN_SKILL).unwrap();

        let loader = Arc::new(SkillLoader::new(Arc::new(FlakyBackend)));
        let executor = SelfHealingExecutor::new(
            loader,
            Arc::new(CannedRepairer {
                replacement,
                calls: Mutex::new(0),
            }),
        );
        let desc = descriptor(&skill_dir);
        (dir, executor, desc)
    }

    fn backups_in(dir: &Path) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("skill.toml.bak_"))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_repair_then_success() {
        let (_dir, executor, desc) = setup(Some(FIXED_SKILL.to_string()));

        let outcome = executor
            .execute(&desc, serde_json::json!({"x": "1"}))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("fixed output"));

        // Exactly one timestamped backup holding the pre-repair source.
        let backups = backups_in(&desc.dir);
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), BROKEN_SKILL);
    }

    #[tokio::test]
    async fn test_both_attempts_fail_surfaces_original_error() {
        // Replacement is still broken, so the retry fails too.
        let (_dir, executor, desc) = setup(Some(BROKEN_SKILL.to_string()));

        let outcome = executor
            .execute(&desc, serde_json::json!({"x": "1"}))
            .await;

        assert!(!outcome.success);
        assert!(outcome.error_text().contains("template exploded"));

        // Pre-repair source stays recoverable from the backup.
        let backups = backups_in(&desc.dir);
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), BROKEN_SKILL);
    }

    #[tokio::test]
    async fn test_repair_failure_gives_up_without_touching_source() {
        let (_dir, executor, desc) = setup(None);

        let outcome = executor
            .execute(&desc, serde_json::json!({"x": "1"}))
            .await;

        assert!(!outcome.success);
        // Source untouched, no backup written.
        assert!(backups_in(&desc.dir).is_empty());
        assert_eq!(
            std::fs::read_to_string(desc.dir.join("skill.toml")).unwrap(),
            BROKEN_SKILL
        );
    }

    #[tokio::test]
    async fn test_healthy_skill_skips_repair() {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("flaky");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(skill_dir.join("skill.toml"), FIXED_SKILL).unwrap();

        let loader = Arc::new(SkillLoader::new(Arc::new(FlakyBackend)));
        let repairer = Arc::new(CannedRepairer {
            replacement: Some(FIXED_SKILL.to_string()),
            calls: Mutex::new(0),
        });
        let executor = SelfHealingExecutor::new(loader, repairer.clone());

        let outcome = executor
            .execute(&descriptor(&skill_dir), serde_json::json!({"x": "1"}))
            .await;

        assert!(outcome.success);
        assert_eq!(*repairer.calls.lock(), 0);
    }

    #[test]
    fn test_extract_source_fenced() {
        let reply = "Here you go:\n```toml\n[execution]\ntype = \"prompt\"\nprompt = \"x\"\n```\nDone.";
        let source = extract_source(reply).unwrap();
        assert!(source.starts_with("[execution]"));
        assert!(!source.contains("```"));
    }

    #[test]
    fn test_extract_source_bare_toml() {
        let source = extract_source(FIXED_SKILL).unwrap();
        assert_eq!(source, FIXED_SKILL.trim());
    }

    #[test]
    fn test_extract_source_rejects_prose() {
        assert!(extract_source("Sorry, I cannot fix this skill.").is_none());
        assert!(extract_source("").is_none());
    }
}

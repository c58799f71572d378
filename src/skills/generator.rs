//! Skill Generator
//!
//! The meta-skill that lets the agent extend itself: a requirement is
//! analyzed, planned, turned into an implementation and persisted under
//! the personal tier, where the next discovery pass picks it up as a
//! regular skill.

use crate::config::{COMPLEXITY_HIGH_CHARS, COMPLEXITY_MEDIUM_CHARS};
use crate::skills::manifest::{
    render_manifest, SkillManifest, IMPLEMENTATION_FILE, MANIFEST_FILE, METADATA_FILE,
};
use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9]+").expect("valid regex"));

/// How many leading words of the requirement seed the suggested name.
const NAME_WORD_COUNT: usize = 3;

/// Coarse implementation complexity estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Result of requirement analysis.
#[derive(Debug, Clone)]
pub struct RequirementAnalysis {
    pub suggested_name: String,
    pub complexity: Complexity,
}

/// Fixed-shape plan document produced before code synthesis.
#[derive(Debug, Clone, Serialize)]
pub struct SkillPlan {
    pub skill_name: String,
    pub purpose: String,
    pub key_features: Vec<String>,
    pub data_sources: Vec<String>,
    pub implementation_steps: Vec<String>,
    pub files_to_create: Vec<String>,
    pub estimated_complexity: Complexity,
}

/// A synthesized skill ready to persist.
#[derive(Debug, Clone)]
pub struct GeneratedSkill {
    pub name: String,
    pub manifest_md: String,
    pub implementation: String,
}

/// Paths written by [`SkillGenerator::persist`].
#[derive(Debug, Clone)]
pub struct PersistedSkill {
    pub name: String,
    pub skill_dir: PathBuf,
    pub created_files: Vec<PathBuf>,
}

/// Pre-authored implementations, keyed by suggested name.
const TEMPLATES: &[(&str, &str)] = &[
    (
        "wallet-summary",
        r#"[parameters.address]
type = "string"
description = "Wallet address to summarize"
required = true

[execution]
type = "http"
endpoint = "https://nileapi.tronscan.org/api/account/tokens?address={{address}}&start=0&limit=20"
method = "GET"
timeout_secs = 15
"#,
    ),
    (
        "batch-transfer",
        r#"[parameters.recipients]
type = "string"
description = "JSON array of {address, amount} recipients"
required = true

[parameters.token]
type = "string"
description = "Token symbol to send"
required = true

[execution]
type = "prompt"
prompt = """
Prepare a batch transfer plan for these recipients: {{recipients}}.
Token: {{token}}. List each transfer as one line with address and amount,
flag any address that repeats, and end with the total amount.
"""
timeout_secs = 30
"#,
    ),
];

/// Generic implementation honoring the invocation contract, used when no
/// template matches.
const GENERIC_TEMPLATE: &str = r#"[parameters.kwargs]
type = "string"
description = "Arguments for the skill as a JSON string"
required = false

[execution]
type = "prompt"
prompt = """
You are a TRON blockchain assistant skill named '{name}'.
Requirement: {requirement}
Input arguments: {{kwargs}}
Fulfill the requirement with the given arguments and reply with the result.
"""
timeout_secs = 30
"#;

/// Requirement-to-artifact pipeline.
pub struct SkillGenerator {
    personal_dir: PathBuf,
}

impl SkillGenerator {
    pub fn new(personal_dir: &Path) -> Self {
        Self {
            personal_dir: personal_dir.to_path_buf(),
        }
    }

    /// Derive a suggested name and complexity from the requirement text.
    pub fn analyze(&self, requirement: &str) -> RequirementAnalysis {
        let words: Vec<String> = WORD_RE
            .find_iter(requirement)
            .take(NAME_WORD_COUNT)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        let suggested_name = if words.is_empty() {
            "custom-skill".to_string()
        } else {
            words.join("-")
        };

        let complexity = if requirement.len() > COMPLEXITY_HIGH_CHARS {
            Complexity::High
        } else if requirement.len() > COMPLEXITY_MEDIUM_CHARS {
            Complexity::Medium
        } else {
            Complexity::Low
        };

        RequirementAnalysis {
            suggested_name,
            complexity,
        }
    }

    /// Produce the fixed-shape plan document.
    pub fn plan(&self, requirement: &str, skill_name: &str) -> SkillPlan {
        let analysis = self.analyze(requirement);
        SkillPlan {
            skill_name: skill_name.to_string(),
            purpose: format!("Implement functionality requested: {}", requirement),
            key_features: vec![
                "Core functionality derived from the request".to_string(),
                "Structured success/failure result".to_string(),
                "Error handling for missing arguments".to_string(),
            ],
            data_sources: vec!["TronScan API".to_string(), "TronGrid API".to_string()],
            implementation_steps: vec![
                "Write the skill manifest".to_string(),
                "Fill in the implementation definition".to_string(),
                "Register via personal-tier discovery".to_string(),
                "Exercise the skill once and keep or delete it".to_string(),
            ],
            files_to_create: vec![
                format!("personal-skills/{}/{}", skill_name, MANIFEST_FILE),
                format!("personal-skills/{}/{}", skill_name, IMPLEMENTATION_FILE),
                format!("personal-skills/{}/{}", skill_name, METADATA_FILE),
            ],
            estimated_complexity: analysis.complexity,
        }
    }

    /// Synthesize the skill files from an approved plan.
    ///
    /// A pre-authored template is reused when the name matches one;
    /// otherwise the generic template is specialized for the request.
    pub fn synthesize(&self, plan: &SkillPlan, requirement: &str) -> GeneratedSkill {
        let implementation = TEMPLATES
            .iter()
            .find(|(name, _)| *name == plan.skill_name)
            .map(|(_, source)| source.to_string())
            .unwrap_or_else(|| {
                GENERIC_TEMPLATE
                    .replace("{name}", &plan.skill_name)
                    .replace("{requirement}", requirement)
            });

        let manifest = SkillManifest {
            name: plan.skill_name.clone(),
            description: plan.purpose.clone(),
            version: "1.0.0".to_string(),
            generated: true,
            tags: vec!["auto-generated".to_string(), "tron".to_string()],
        };
        let instructions = format!(
            "# {}\n\n## When to use this skill\n\nUse this skill when: {}\n",
            plan.skill_name, requirement
        );

        GeneratedSkill {
            name: plan.skill_name.clone(),
            manifest_md: render_manifest(&manifest, &instructions),
            implementation,
        }
    }

    /// Write the artifact under the personal tier, creating directories
    /// as needed. Regenerating the same name overwrites the prior files.
    pub fn persist(&self, generated: &GeneratedSkill) -> Result<PersistedSkill> {
        let skill_dir = self.personal_dir.join(&generated.name);
        std::fs::create_dir_all(&skill_dir)
            .with_context(|| format!("failed to create {}", skill_dir.display()))?;

        let manifest_path = skill_dir.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, &generated.manifest_md)?;

        let impl_path = skill_dir.join(IMPLEMENTATION_FILE);
        std::fs::write(&impl_path, &generated.implementation)?;

        let metadata = serde_json::json!({
            "created_at": Utc::now().to_rfc3339(),
            "generated": true,
            "version": "1.0.0",
        });
        let metadata_path = skill_dir.join(METADATA_FILE);
        std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        info!("Generated skill '{}' persisted to {}", generated.name, skill_dir.display());
        Ok(PersistedSkill {
            name: generated.name.clone(),
            skill_dir,
            created_files: vec![manifest_path, impl_path, metadata_path],
        })
    }

    /// Full pipeline: analysis, plan, synthesis, persistence.
    ///
    /// An explicit `skill_name` overrides the suggested one, mirroring
    /// the model supplying its own name in the tool call.
    pub fn generate(&self, requirement: &str, skill_name: Option<&str>) -> Result<PersistedSkill> {
        let analysis = self.analyze(requirement);
        let name = match skill_name {
            Some(name) if !name.trim().is_empty() => {
                name.trim().to_lowercase().replace(' ', "-")
            }
            _ => analysis.suggested_name.clone(),
        };

        let plan = self.plan(requirement, &name);
        let generated = self.synthesize(&plan, requirement);
        self.persist(&generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::manifest::parse_manifest;
    use crate::skills::runtime::SkillImpl;
    use tempfile::TempDir;

    #[test]
    fn test_analyze_name_and_complexity() {
        let gen = SkillGenerator::new(Path::new("/tmp/unused"));

        let analysis = gen.analyze("Batch transfer TRX to many wallets");
        assert_eq!(analysis.suggested_name, "batch-transfer-trx");
        assert_eq!(analysis.complexity, Complexity::Low);

        let medium = "x".repeat(COMPLEXITY_MEDIUM_CHARS + 1);
        assert_eq!(gen.analyze(&medium).complexity, Complexity::Medium);

        let high = "x".repeat(COMPLEXITY_HIGH_CHARS + 1);
        assert_eq!(gen.analyze(&high).complexity, Complexity::High);
    }

    #[test]
    fn test_analyze_empty_requirement() {
        let gen = SkillGenerator::new(Path::new("/tmp/unused"));
        assert_eq!(gen.analyze("!!!").suggested_name, "custom-skill");
    }

    #[test]
    fn test_plan_file_manifest() {
        let gen = SkillGenerator::new(Path::new("/tmp/unused"));
        let plan = gen.plan("Summarize my wallet", "wallet-summary");
        assert_eq!(plan.files_to_create.len(), 3);
        assert!(plan.files_to_create[0].contains("wallet-summary/SKILL.md"));
    }

    #[test]
    fn test_synthesize_uses_template_on_name_match() {
        let gen = SkillGenerator::new(Path::new("/tmp/unused"));
        let plan = gen.plan("Summarize my wallet", "wallet-summary");
        let generated = gen.synthesize(&plan, "Summarize my wallet");
        assert!(generated.implementation.contains("account/tokens"));

        // Template output must itself be a valid implementation.
        SkillImpl::parse(&generated.implementation).unwrap();
    }

    #[test]
    fn test_synthesize_generic_fallback() {
        let gen = SkillGenerator::new(Path::new("/tmp/unused"));
        let plan = gen.plan("Track SR voting rewards", "sr-rewards");
        let generated = gen.synthesize(&plan, "Track SR voting rewards");
        assert!(generated.implementation.contains("Track SR voting rewards"));
        SkillImpl::parse(&generated.implementation).unwrap();
    }

    #[test]
    fn test_generate_persists_complete_artifact() {
        let dir = TempDir::new().unwrap();
        let gen = SkillGenerator::new(dir.path());

        let persisted = gen
            .generate("Make a tool to batch transfer TRX", Some("batch-transfer"))
            .unwrap();

        assert_eq!(persisted.created_files.len(), 3);
        let manifest =
            std::fs::read_to_string(persisted.skill_dir.join(MANIFEST_FILE)).unwrap();
        let parsed = parse_manifest(&manifest).unwrap();
        assert_eq!(parsed.manifest.name, "batch-transfer");
        assert!(parsed.manifest.generated);

        let metadata: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(persisted.skill_dir.join(METADATA_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["generated"], true);
    }

    #[test]
    fn test_regeneration_overwrites() {
        let dir = TempDir::new().unwrap();
        let gen = SkillGenerator::new(dir.path());

        gen.generate("first version", Some("my-skill")).unwrap();
        let second = gen.generate("second version", Some("my-skill")).unwrap();

        let manifest =
            std::fs::read_to_string(second.skill_dir.join(MANIFEST_FILE)).unwrap();
        assert!(manifest.contains("second version"));
    }

    #[test]
    fn test_explicit_name_normalized() {
        let dir = TempDir::new().unwrap();
        let gen = SkillGenerator::new(dir.path());
        let persisted = gen.generate("whatever", Some("My Cool Skill")).unwrap();
        assert_eq!(persisted.name, "my-cool-skill");
    }
}

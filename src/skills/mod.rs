//! Self-Extending Skills System
//!
//! Skills live in directories carrying a `SKILL.md` manifest, a
//! `skill.toml` implementation and (for generated ones) a
//! `metadata.json`. Two tiers are merged at discovery time:
//!
//! ```text
//! skills/            system tier (shipped)
//! personal-skills/   personal tier (generated; wins name conflicts)
//! ```
//!
//! The generator writes new skills into the personal tier; the loader
//! re-instantiates implementations when their file changes, which is how
//! a self-healing repair becomes visible without a restart.

pub mod generator;
pub mod manifest;
pub mod registry;
pub mod runtime;

pub use generator::{GeneratedSkill, PersistedSkill, SkillGenerator, SkillPlan};
pub use manifest::{parse_manifest, SkillManifest};
pub use registry::{SkillDescriptor, SkillRegistry, SkillTier};
pub use runtime::{Capability, PromptBackend, SkillLoader, SkillOutcome};

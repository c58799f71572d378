//! Skill Registry
//!
//! Discovers skills across the two directory tiers and merges them into
//! a single descriptor map. Personal skills always win a name conflict
//! with system skills, which is what lets a generated skill shadow a
//! shipped one.

use crate::skills::manifest::{self, SkillManifest};
use crate::skills::runtime::SkillImpl;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Provenance tier of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillTier {
    System,
    Personal,
}

impl SkillTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Personal => "personal",
        }
    }
}

/// Registry entry for one discovered skill.
#[derive(Debug, Clone)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    pub tier: SkillTier,
    pub generated: bool,
    pub dir: PathBuf,
    /// JSON schema of the declared parameters. A permissive catch-all
    /// schema when the implementation declares none.
    pub parameters: Value,
}

impl SkillDescriptor {
    /// Tool definition in completion-wire (function-calling) format.
    pub fn tool_definition(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Two-tier skill registry.
pub struct SkillRegistry {
    system_dir: PathBuf,
    personal_dir: PathBuf,
    entries: parking_lot::RwLock<HashMap<String, SkillDescriptor>>,
}

impl SkillRegistry {
    pub fn new(system_dir: &Path, personal_dir: &Path) -> Self {
        Self {
            system_dir: system_dir.to_path_buf(),
            personal_dir: personal_dir.to_path_buf(),
            entries: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Directory a newly generated skill should land in.
    pub fn personal_dir(&self) -> &Path {
        &self.personal_dir
    }

    /// Rescan both tiers and rebuild the merged map.
    ///
    /// System entries are inserted first; each personal entry then evicts
    /// any same-named system entry. Re-discovery with no filesystem
    /// change yields an identical descriptor set.
    pub fn discover(&self) -> usize {
        let mut merged: HashMap<String, SkillDescriptor> = HashMap::new();

        for descriptor in scan_tier(&self.system_dir, SkillTier::System) {
            merged.insert(descriptor.name.clone(), descriptor);
        }
        for descriptor in scan_tier(&self.personal_dir, SkillTier::Personal) {
            if merged.remove(&descriptor.name).is_some() {
                debug!("Personal skill '{}' overrides system skill", descriptor.name);
            }
            merged.insert(descriptor.name.clone(), descriptor);
        }

        let count = merged.len();
        *self.entries.write() = merged;
        debug!("Skill discovery complete: {} skills", count);
        count
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<SkillDescriptor> {
        self.entries.read().get(name).cloned()
    }

    /// All descriptors, name-sorted for stable output.
    pub fn descriptors(&self) -> Vec<SkillDescriptor> {
        let mut all: Vec<SkillDescriptor> = self.entries.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Tool definitions for every discovered skill.
    pub fn tool_definitions(&self) -> Vec<Value> {
        self.descriptors()
            .iter()
            .map(|d| d.tool_definition())
            .collect()
    }

    /// Delete a personal skill directory. Returns false when absent.
    pub fn delete_personal(&self, name: &str) -> std::io::Result<bool> {
        let dir = self.personal_dir.join(name);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        self.entries.write().remove(name);
        Ok(true)
    }
}

/// Scan one directory root for skill directories.
fn scan_tier(root: &Path, tier: SkillTier) -> Vec<SkillDescriptor> {
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return found,
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }

        let parsed = match manifest::load_manifest(&dir) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Directories without a parsable manifest are not skills.
                warn!("Skipping {} ({:#})", dir.display(), e);
                continue;
            }
        };

        found.push(build_descriptor(parsed.manifest, tier, dir));
    }

    found
}

fn build_descriptor(manifest: SkillManifest, tier: SkillTier, dir: PathBuf) -> SkillDescriptor {
    let parameters = std::fs::read_to_string(dir.join(manifest::IMPLEMENTATION_FILE))
        .ok()
        .and_then(|source| SkillImpl::parse(&source).ok())
        .map(|def| def.parameter_schema())
        .unwrap_or_else(catch_all_schema);

    SkillDescriptor {
        name: manifest.name,
        description: manifest.description,
        tier,
        generated: manifest.generated,
        dir,
        parameters,
    }
}

/// Schema accepted when a skill declares no parameters.
fn catch_all_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "kwargs": {
                "type": "string",
                "description": "Arguments for the skill as a JSON string"
            }
        },
        "required": []
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(root: &Path, name: &str, description: &str, generated: bool) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!(
                "---\nname: {}\ndescription: {}\ngenerated: {}\n---\n\nInstructions.\n",
                name, description, generated
            ),
        )
        .unwrap();
        std::fs::write(
            dir.join("skill.toml"),
            "[execution]\ntype = \"prompt\"\nprompt = \"do it\"\n",
        )
        .unwrap();
    }

    fn two_tier() -> (TempDir, SkillRegistry) {
        let dir = TempDir::new().unwrap();
        let system = dir.path().join("skills");
        let personal = dir.path().join("personal-skills");
        std::fs::create_dir_all(&system).unwrap();
        std::fs::create_dir_all(&personal).unwrap();
        let registry = SkillRegistry::new(&system, &personal);
        (dir, registry)
    }

    #[test]
    fn test_discovery_both_tiers() {
        let (dir, registry) = two_tier();
        write_skill(&dir.path().join("skills"), "token-price", "Price lookup", false);
        write_skill(
            &dir.path().join("personal-skills"),
            "batch-transfer",
            "Batch transfers",
            true,
        );

        assert_eq!(registry.discover(), 2);
        assert_eq!(registry.get("token-price").unwrap().tier, SkillTier::System);
        let personal = registry.get("batch-transfer").unwrap();
        assert_eq!(personal.tier, SkillTier::Personal);
        assert!(personal.generated);
    }

    #[test]
    fn test_personal_wins_name_conflict() {
        let (dir, registry) = two_tier();
        write_skill(&dir.path().join("skills"), "wallet-summary", "System version", false);
        write_skill(
            &dir.path().join("personal-skills"),
            "wallet-summary",
            "Personal version",
            true,
        );

        assert_eq!(registry.discover(), 1);
        let entry = registry.get("wallet-summary").unwrap();
        assert_eq!(entry.tier, SkillTier::Personal);
        assert_eq!(entry.description, "Personal version");
    }

    #[test]
    fn test_rediscovery_is_idempotent() {
        let (dir, registry) = two_tier();
        write_skill(&dir.path().join("skills"), "token-price", "Price lookup", false);

        registry.discover();
        let first: Vec<String> = registry.descriptors().iter().map(|d| d.name.clone()).collect();
        registry.discover();
        let second: Vec<String> = registry.descriptors().iter().map(|d| d.name.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unparsable_manifest_skipped() {
        let (dir, registry) = two_tier();
        let bad = dir.path().join("skills").join("broken");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join("SKILL.md"), "no front matter here").unwrap();
        write_skill(&dir.path().join("skills"), "token-price", "Price lookup", false);

        assert_eq!(registry.discover(), 1);
        assert!(registry.get("broken").is_none());
    }

    #[test]
    fn test_tool_definition_shape() {
        let (dir, registry) = two_tier();
        write_skill(&dir.path().join("skills"), "token-price", "Price lookup", false);
        registry.discover();

        let tools = registry.tool_definitions();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "token-price");
    }

    #[test]
    fn test_delete_personal() {
        let (dir, registry) = two_tier();
        write_skill(&dir.path().join("personal-skills"), "temp-skill", "Temp", true);
        registry.discover();

        assert!(registry.delete_personal("temp-skill").unwrap());
        assert!(registry.get("temp-skill").is_none());
        assert!(!registry.delete_personal("temp-skill").unwrap());
    }
}

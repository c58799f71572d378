//! Skill Manifests
//!
//! Every skill directory carries a `SKILL.md`: a `---`-delimited YAML
//! front-matter block (identity + metadata) followed by free-form
//! instructions. Directories whose manifest fails to parse are skipped by
//! discovery.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Manifest file name inside a skill directory.
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Implementation file name inside a skill directory.
pub const IMPLEMENTATION_FILE: &str = "skill.toml";

/// Metadata file written alongside generated skills.
pub const METADATA_FILE: &str = "metadata.json";

/// Front-matter block of a SKILL.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillManifest {
    /// Unique skill name (registry key).
    pub name: String,
    /// Human-readable description, also shown to the model.
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// True for agent-generated skills.
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// A parsed SKILL.md: manifest plus instruction body.
#[derive(Debug, Clone)]
pub struct ParsedManifest {
    pub manifest: SkillManifest,
    pub instructions: String,
}

/// Parse SKILL.md content.
pub fn parse_manifest(content: &str) -> Result<ParsedManifest> {
    if !content.starts_with("---") {
        bail!("manifest has no front-matter block");
    }

    let mut parts = content.splitn(3, "---");
    parts.next(); // empty prefix before the first delimiter
    let front_matter = parts.next().context("unterminated front-matter block")?;
    let body = parts.next().context("unterminated front-matter block")?;

    let manifest: SkillManifest =
        serde_yaml::from_str(front_matter).context("invalid front matter")?;
    if manifest.name.trim().is_empty() {
        bail!("manifest missing name");
    }

    Ok(ParsedManifest {
        manifest,
        instructions: body.trim().to_string(),
    })
}

/// Read and parse a skill directory's SKILL.md.
pub fn load_manifest(skill_dir: &Path) -> Result<ParsedManifest> {
    let path = skill_dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_manifest(&content)
}

/// Render a SKILL.md from a manifest and instruction body.
pub fn render_manifest(manifest: &SkillManifest, instructions: &str) -> String {
    // serde_yaml handles quoting for values containing colons etc.
    let front_matter = serde_yaml::to_string(manifest).unwrap_or_default();
    format!("---\n{}---\n\n{}\n", front_matter, instructions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"---
name: token-price
description: Fetch the current price of a TRON ecosystem token
version: 1.0.0
generated: false
tags: [price, market]
---

# Token Price

Use this skill to look up spot prices.
"#;

    #[test]
    fn test_parse_manifest() {
        let parsed = parse_manifest(SAMPLE).unwrap();
        assert_eq!(parsed.manifest.name, "token-price");
        assert!(!parsed.manifest.generated);
        assert_eq!(parsed.manifest.tags, vec!["price", "market"]);
        assert!(parsed.instructions.starts_with("# Token Price"));
    }

    #[test]
    fn test_parse_defaults() {
        let content = "---\nname: minimal\ndescription: A minimal skill\n---\nbody";
        let parsed = parse_manifest(content).unwrap();
        assert_eq!(parsed.manifest.version, "1.0.0");
        assert!(!parsed.manifest.generated);
        assert!(parsed.manifest.tags.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_front_matter() {
        assert!(parse_manifest("# Just a readme").is_err());
        assert!(parse_manifest("---\nname: x\ndescription: y").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_name() {
        let content = "---\nname: \"\"\ndescription: y\n---\nbody";
        assert!(parse_manifest(content).is_err());
    }

    #[test]
    fn test_render_round_trip() {
        let manifest = SkillManifest {
            name: "wallet-summary".to_string(),
            description: "Summarize a wallet".to_string(),
            version: "1.0.0".to_string(),
            generated: true,
            tags: vec!["auto-generated".to_string()],
        };
        let rendered = render_manifest(&manifest, "## Usage\nCall it.");
        let parsed = parse_manifest(&rendered).unwrap();
        assert_eq!(parsed.manifest.name, "wallet-summary");
        assert!(parsed.manifest.generated);
        assert_eq!(parsed.instructions, "## Usage\nCall it.");
    }
}

//! Skill Runtime
//!
//! Execution side of the registry. Every skill - builtin or discovered -
//! sits behind the [`Capability`] trait: one async entry point taking a
//! named-parameter bag and returning a structured result. Discovered
//! skills are defined by a `skill.toml` implementation file which the
//! loader re-reads whenever its modification time changes, so a repair
//! written by the executor takes effect on the next call without a
//! restart.

use crate::error::AgentError;
use crate::skills::manifest::IMPLEMENTATION_FILE;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Structured result of a skill invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SkillOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            payload: None,
            error: None,
        }
    }

    pub fn ok_with_payload(message: impl Into<String>, payload: Value) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Error text for failures, falling back to a generic message.
    pub fn error_text(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// A named unit of functionality with one async entry point.
///
/// Errors returned here are converted to structured failures by the
/// runtime, so callers only ever see a [`SkillOutcome`].
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, params: Value) -> Result<SkillOutcome>;
}

/// Narrow interface to the completion service for prompt-type skills.
#[async_trait]
pub trait PromptBackend: Send + Sync {
    async fn complete_prompt(&self, prompt: &str) -> Result<String>;
}

/// How a dynamic skill executes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionKind {
    /// Templated HTTP request.
    Http,
    /// Templated model completion.
    Prompt,
}

/// Parameter declaration inside skill.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

/// Execution section of skill.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSpec {
    #[serde(rename = "type")]
    pub kind: ExecutionKind,
    /// Endpoint template for http execution; `{{param}}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    /// Prompt template for prompt execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// A skill implementation as stored in skill.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillImpl {
    #[serde(default)]
    pub parameters: HashMap<String, ParameterSpec>,
    pub execution: ExecutionSpec,
}

impl SkillImpl {
    pub fn parse(source: &str) -> Result<Self> {
        let parsed: Self = toml::from_str(source).context("invalid skill implementation")?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check that the execution section is usable.
    pub fn validate(&self) -> Result<()> {
        match self.execution.kind {
            ExecutionKind::Http => {
                if self.execution.endpoint.is_none() {
                    anyhow::bail!("http execution requires an endpoint");
                }
            }
            ExecutionKind::Prompt => {
                if self.execution.prompt.is_none() {
                    anyhow::bail!("prompt execution requires a prompt template");
                }
            }
        }
        Ok(())
    }

    /// JSON schema of the declared parameters, for tool registration.
    pub fn parameter_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.parameters {
            properties.insert(
                name.clone(),
                serde_json::json!({
                    "type": spec.param_type,
                    "description": spec.description,
                }),
            );
            if spec.required {
                required.push(Value::String(name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Substitute `{{name}}` placeholders from the parameter bag.
fn render_template(template: &str, params: &Value) -> String {
    let mut rendered = template.to_string();
    if let Some(map) = params.as_object() {
        for (key, value) in map {
            let placeholder = format!("{{{{{}}}}}", key);
            let replacement = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&placeholder, &replacement);
        }
    }
    rendered
}

/// A loaded dynamic skill.
pub struct DynamicSkill {
    name: String,
    definition: Arc<SkillImpl>,
    http: reqwest::Client,
    prompt_backend: Arc<dyn PromptBackend>,
}

#[async_trait]
impl Capability for DynamicSkill {
    async fn invoke(&self, params: Value) -> Result<SkillOutcome> {
        // Required-parameter enforcement before touching the network.
        for (name, spec) in &self.definition.parameters {
            if spec.required && params.get(name).is_none() {
                return Ok(SkillOutcome::failure(format!(
                    "missing required parameter: {}",
                    name
                )));
            }
        }

        let timeout = std::time::Duration::from_secs(self.definition.execution.timeout_secs);
        match self.definition.execution.kind {
            ExecutionKind::Http => {
                let endpoint = self
                    .definition
                    .execution
                    .endpoint
                    .as_deref()
                    .context("http skill without endpoint")?;
                let url = render_template(endpoint, &params);
                debug!("Skill '{}' http call: {}", self.name, url);

                let request = match self.definition.execution.method.to_uppercase().as_str() {
                    "POST" => self.http.post(&url).json(&params),
                    _ => self.http.get(&url),
                };
                let response = request.timeout(timeout).send().await?;
                if !response.status().is_success() {
                    return Ok(SkillOutcome::failure(format!(
                        "endpoint returned HTTP {}",
                        response.status()
                    )));
                }
                let payload: Value = response.json().await.unwrap_or(Value::Null);
                Ok(SkillOutcome::ok_with_payload(
                    format!("Skill '{}' executed", self.name),
                    payload,
                ))
            }
            ExecutionKind::Prompt => {
                let template = self
                    .definition
                    .execution
                    .prompt
                    .as_deref()
                    .context("prompt skill without template")?;
                let prompt = render_template(template, &params);
                let reply = self.prompt_backend.complete_prompt(&prompt).await?;
                Ok(SkillOutcome::ok(reply))
            }
        }
    }
}

type ImplCache = HashMap<String, (SystemTime, Arc<SkillImpl>)>;

/// Loads dynamic skill implementations with mtime-gated reuse.
pub struct SkillLoader {
    cache: Mutex<ImplCache>,
    http: reqwest::Client,
    prompt_backend: Arc<dyn PromptBackend>,
}

impl SkillLoader {
    pub fn new(prompt_backend: Arc<dyn PromptBackend>) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            prompt_backend,
        }
    }

    /// Path of a skill's implementation file.
    pub fn implementation_path(skill_dir: &Path) -> PathBuf {
        skill_dir.join(IMPLEMENTATION_FILE)
    }

    /// Read the current implementation source (for repair).
    pub fn implementation_source(&self, skill_dir: &Path) -> Result<String> {
        let path = Self::implementation_path(skill_dir);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))
    }

    /// Persist a replacement implementation and drop the cached unit so
    /// the next invocation re-reads it.
    pub fn write_implementation(&self, name: &str, skill_dir: &Path, source: &str) -> Result<()> {
        let path = Self::implementation_path(skill_dir);
        std::fs::write(&path, source)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.invalidate(name);
        info!("Skill '{}' implementation updated", name);
        Ok(())
    }

    /// Drop a cached execution unit.
    pub fn invalidate(&self, name: &str) {
        self.cache.lock().remove(name);
    }

    /// Instantiate an execution unit for a skill, re-reading the
    /// implementation when the file changed on disk.
    pub fn load(&self, name: &str, skill_dir: &Path) -> Result<DynamicSkill, AgentError> {
        let path = Self::implementation_path(skill_dir);
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|_| AgentError::Capability {
                name: name.to_string(),
                message: format!("missing implementation file {}", path.display()),
            })?;

        let definition = {
            let mut cache = self.cache.lock();
            match cache.get(name) {
                Some((cached_mtime, definition)) if *cached_mtime == modified => {
                    definition.clone()
                }
                _ => {
                    let source =
                        std::fs::read_to_string(&path).map_err(|e| AgentError::Capability {
                            name: name.to_string(),
                            message: format!("unreadable implementation: {}", e),
                        })?;
                    let parsed =
                        SkillImpl::parse(&source).map_err(|e| AgentError::Capability {
                            name: name.to_string(),
                            message: format!("broken implementation: {:#}", e),
                        })?;
                    let definition = Arc::new(parsed);
                    debug!("Skill '{}' implementation (re)loaded", name);
                    cache.insert(name.to_string(), (modified, definition.clone()));
                    definition
                }
            }
        };

        Ok(DynamicSkill {
            name: name.to_string(),
            definition,
            http: self.http.clone(),
            prompt_backend: self.prompt_backend.clone(),
        })
    }

    /// Load and invoke in one step, converting raised errors into
    /// structured failures per the invocation contract.
    pub async fn invoke(&self, name: &str, skill_dir: &Path, params: Value) -> SkillOutcome {
        let skill = match self.load(name, skill_dir) {
            Ok(skill) => skill,
            Err(e) => {
                warn!("Skill '{}' failed to load: {}", name, e);
                return SkillOutcome::failure(e.to_string());
            }
        };

        match skill.invoke(params).await {
            Ok(outcome) => outcome,
            Err(e) => SkillOutcome::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct EchoBackend;

    #[async_trait]
    impl PromptBackend for EchoBackend {
        async fn complete_prompt(&self, prompt: &str) -> Result<String> {
            Ok(format!("echo: {}", prompt))
        }
    }

    const PROMPT_SKILL: &str = r#"
[parameters.question]
type = "string"
description = "Question to answer"
required = true

[execution]
type = "prompt"
prompt = "Answer briefly: {{question}}"
"#;

    fn write_skill(dir: &Path, source: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(IMPLEMENTATION_FILE), source).unwrap();
    }

    #[test]
    fn test_parse_and_schema() {
        let parsed = SkillImpl::parse(PROMPT_SKILL).unwrap();
        assert_eq!(parsed.execution.kind, ExecutionKind::Prompt);
        let schema = parsed.parameter_schema();
        assert_eq!(schema["properties"]["question"]["type"], "string");
        assert_eq!(schema["required"][0], "question");
    }

    #[test]
    fn test_parse_rejects_http_without_endpoint() {
        let source = "[execution]\ntype = \"http\"\n";
        assert!(SkillImpl::parse(source).is_err());
    }

    #[test]
    fn test_render_template() {
        let params = serde_json::json!({"symbol": "TRX", "limit": 5});
        let rendered = render_template("price of {{symbol}} top {{limit}}", &params);
        assert_eq!(rendered, "price of TRX top 5");
    }

    #[tokio::test]
    async fn test_prompt_skill_invocation() {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("qa");
        write_skill(&skill_dir, PROMPT_SKILL);

        let loader = SkillLoader::new(Arc::new(EchoBackend));
        let outcome = loader
            .invoke("qa", &skill_dir, serde_json::json!({"question": "why?"}))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("echo: Answer briefly: why?"));
    }

    #[tokio::test]
    async fn test_missing_required_parameter() {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("qa");
        write_skill(&skill_dir, PROMPT_SKILL);

        let loader = SkillLoader::new(Arc::new(EchoBackend));
        let outcome = loader.invoke("qa", &skill_dir, serde_json::json!({})).await;

        assert!(!outcome.success);
        assert!(outcome.error_text().contains("question"));
    }

    #[tokio::test]
    async fn test_missing_implementation_is_descriptive() {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("ghost");
        std::fs::create_dir_all(&skill_dir).unwrap();

        let loader = SkillLoader::new(Arc::new(EchoBackend));
        let outcome = loader.invoke("ghost", &skill_dir, Value::Null).await;

        assert!(!outcome.success);
        assert!(outcome.error_text().contains("missing implementation"));
    }

    #[tokio::test]
    async fn test_hot_reload_after_write() {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("qa");
        write_skill(&skill_dir, PROMPT_SKILL);

        let loader = SkillLoader::new(Arc::new(EchoBackend));
        let first = loader
            .invoke("qa", &skill_dir, serde_json::json!({"question": "a"}))
            .await;
        assert_eq!(first.message.as_deref(), Some("echo: Answer briefly: a"));

        // Rewrite through the loader so the cached unit is dropped.
        let replacement = PROMPT_SKILL.replace("Answer briefly", "Answer fully");
        loader
            .write_implementation("qa", &skill_dir, &replacement)
            .unwrap();

        let second = loader
            .invoke("qa", &skill_dir, serde_json::json!({"question": "a"}))
            .await;
        assert_eq!(second.message.as_deref(), Some("echo: Answer fully: a"));
    }
}

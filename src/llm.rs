//! Completion Service Client
//!
//! OpenAI-compatible chat client used for agent turns (token-streamed,
//! with function-call declarations) and for single-shot calls (skill
//! repair and code synthesis).

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A chat message on the completion wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::plain("assistant", content)
    }

    /// Tool-result message answering a specific call id.
    pub fn tool_result(call_id: &str, content: &str) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }

    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A completed function call echoed back into the message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    pub arguments: String,
}

/// One incremental emission event from a streamed completion.
///
/// Exactly what a provider chunk carries: optional plain-text content and
/// zero or more tool-call fragments.
#[derive(Debug, Clone, Default)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
}

/// A tool-call fragment. Providers split one logical call across many of
/// these: the first usually carries id + name, later ones only argument
/// text. Some providers re-send the name with an empty id.
#[derive(Debug, Clone, Default)]
pub struct ToolCallDelta {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

// --- wire structures for the streamed response ---

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: RawDelta,
}

#[derive(Debug, Deserialize, Default)]
struct RawDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<RawToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct RawToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<RawFunctionDelta>,
}

#[derive(Debug, Deserialize, Default)]
struct RawFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible completion client.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(|s| s.to_string()),
            model: model.to_string(),
        }
    }

    /// Create from config.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            &config.ai_api_base,
            config.ai_api_key.as_deref(),
            &config.ai_model,
        )
    }

    /// Check if an API key is configured.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("AI_API_KEY not set - completion service unavailable")
    }

    /// Single-shot completion. Used by skill repair and code synthesis.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.1,
        });

        debug!("Completion request: model={}, messages={}", self.model, messages.len());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("completion API error {}: {}", status, text);
        }

        let parsed: CompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("completion response contained no content")?;

        Ok(content)
    }

    /// Streamed completion with function-call declarations.
    ///
    /// Returns a channel of [`StreamDelta`] events; the stream task ends
    /// when the provider sends `[DONE]` or the connection closes.
    pub async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<mpsc::Receiver<StreamDelta>> {
        let mut request = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if !tools.is_empty() {
            request["tools"] = serde_json::Value::Array(tools.to_vec());
            request["tool_choice"] = serde_json::json!("auto");
        }

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("completion API error {}: {}", status, text);
        }

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            // Byte buffer: a chunk boundary may fall inside a UTF-8
            // sequence, so decoding happens per complete line only.
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("completion stream error: {}", e);
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                // SSE events are newline-delimited `data: {...}` lines.
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line_bytes).trim().to_string();

                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload == "[DONE]" {
                        return;
                    }
                    match parse_stream_payload(payload) {
                        Some(delta) => {
                            if tx.send(delta).await.is_err() {
                                return;
                            }
                        }
                        None => debug!("skipping unparsable stream payload"),
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[async_trait::async_trait]
impl crate::skills::runtime::PromptBackend for ChatClient {
    async fn complete_prompt(&self, prompt: &str) -> Result<String> {
        self.complete(&[ChatMessage::user(prompt)]).await
    }
}

/// Parse one SSE data payload into a [`StreamDelta`].
fn parse_stream_payload(payload: &str) -> Option<StreamDelta> {
    let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
    let raw = chunk.choices.into_iter().next()?.delta;

    let tool_calls = raw
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let function = tc.function.unwrap_or_default();
            ToolCallDelta {
                id: tc.id,
                name: function.name,
                arguments: function.arguments,
            }
        })
        .collect();

    Some(StreamDelta {
        content: raw.content,
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_payload() {
        let payload = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        let delta = parse_stream_payload(payload).unwrap();
        assert_eq!(delta.content.as_deref(), Some("Hello"));
        assert!(delta.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_tool_call_payload() {
        let payload = r#"{"choices":[{"delta":{"tool_calls":[
            {"id":"call_1","function":{"name":"get_token_price","arguments":"{\"sym"}}
        ]}}]}"#;
        let delta = parse_stream_payload(payload).unwrap();
        assert_eq!(delta.tool_calls.len(), 1);
        let tc = &delta.tool_calls[0];
        assert_eq!(tc.id.as_deref(), Some("call_1"));
        assert_eq!(tc.name.as_deref(), Some("get_token_price"));
        assert_eq!(tc.arguments.as_deref(), Some("{\"sym"));
    }

    #[test]
    fn test_parse_argument_only_payload() {
        let payload = r#"{"choices":[{"delta":{"tool_calls":[
            {"function":{"arguments":"bol\":\"TRX\"}"}}
        ]}}]}"#;
        let delta = parse_stream_payload(payload).unwrap();
        let tc = &delta.tool_calls[0];
        assert!(tc.id.is_none());
        assert!(tc.name.is_none());
        assert_eq!(tc.arguments.as_deref(), Some("bol\":\"TRX\"}"));
    }

    #[test]
    fn test_parse_garbage_payload() {
        assert!(parse_stream_payload("not json").is_none());
    }

    #[test]
    fn test_tool_result_message() {
        let msg = ChatMessage::tool_result("call_7", "done");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_7"));
    }
}

//! Tool-Call Accumulator
//!
//! Rebuilds complete function-call requests from the incremental deltas
//! of a streamed completion. Providers interleave plain text with
//! tool-call fragments and split one call's JSON arguments across many
//! chunks; this keeps exactly one slot open at a time and finalizes it
//! when a different call id appears or the stream ends.
//!
//! Argument fragments are concatenated verbatim and in order - the JSON
//! is only parsed once, at finalization, and a parse failure yields an
//! empty argument map flagged for error reporting instead of a panic or
//! a dropped call.

use crate::llm::{StreamDelta, ToolCallDelta};
use serde_json::{Map, Value};
use tracing::warn;

/// A finalized tool-call request, ready for dispatch.
#[derive(Debug, Clone)]
pub struct CompletedToolCall {
    pub id: String,
    pub name: String,
    /// Exact concatenation of the streamed argument fragments.
    pub raw_arguments: String,
    /// Parsed argument bag; empty when parsing failed.
    pub arguments: Map<String, Value>,
    /// Set when `raw_arguments` was not valid JSON.
    pub parse_error: bool,
}

impl CompletedToolCall {
    /// Arguments as a JSON value for capability invocation.
    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }
}

/// The slot currently receiving fragments.
#[derive(Debug, Default)]
struct OpenSlot {
    id: String,
    name: String,
    arguments: String,
}

/// Streaming accumulator. Feed every delta, then call [`finish`].
///
/// [`finish`]: ToolCallAccumulator::finish
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    open: Option<OpenSlot>,
    completed: Vec<CompletedToolCall>,
    text: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while no tool call has been seen yet; used to decide whether
    /// text deltas can be forwarded to the user immediately.
    pub fn no_calls_seen(&self) -> bool {
        self.open.is_none() && self.completed.is_empty()
    }

    /// Plain-text content accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume one stream delta.
    pub fn push(&mut self, delta: &StreamDelta) {
        if let Some(content) = &delta.content {
            self.text.push_str(content);
        }
        for fragment in &delta.tool_calls {
            self.push_fragment(fragment);
        }
    }

    fn push_fragment(&mut self, fragment: &ToolCallDelta) {
        // A fresh id that differs from the open slot closes it first.
        // An empty/absent id continues the open slot: some providers
        // re-send the function name without repeating the id.
        if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
            let switching = self
                .open
                .as_ref()
                .is_some_and(|slot| slot.id != id);
            if switching {
                self.finalize_open();
            }
            if self.open.is_none() {
                self.open = Some(OpenSlot {
                    id: id.to_string(),
                    ..Default::default()
                });
            }
        }

        let Some(slot) = self.open.as_mut() else {
            // Fragment before any id was seen; nothing to attach it to.
            warn!("Dropping tool-call fragment with no open slot");
            return;
        };

        if let Some(name) = fragment.name.as_deref().filter(|n| !n.is_empty()) {
            if slot.name.is_empty() {
                slot.name = name.to_string();
            }
        }
        if let Some(arguments) = &fragment.arguments {
            slot.arguments.push_str(arguments);
        }
    }

    fn finalize_open(&mut self) {
        let Some(slot) = self.open.take() else {
            return;
        };
        if slot.name.is_empty() {
            // Provider noise: a slot that never received a function name
            // cannot be dispatched.
            warn!("Dropping tool call '{}' with empty function name", slot.id);
            return;
        }

        let (arguments, parse_error) = parse_arguments(&slot.arguments);
        if parse_error {
            warn!(
                "Tool call '{}' ({}) carried malformed arguments",
                slot.id, slot.name
            );
        }

        self.completed.push(CompletedToolCall {
            id: slot.id,
            name: slot.name,
            raw_arguments: slot.arguments,
            arguments,
            parse_error,
        });
    }

    /// End of stream: finalize any open slot and return the completed
    /// calls in first-appearance order.
    pub fn finish(mut self) -> (String, Vec<CompletedToolCall>) {
        self.finalize_open();
        (self.text, self.completed)
    }
}

/// Defensive argument parsing. Empty text counts as an empty bag, not an
/// error; anything non-empty must be a JSON object.
fn parse_arguments(raw: &str) -> (Map<String, Value>, bool) {
    if raw.trim().is_empty() {
        return (Map::new(), false);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => (map, false),
        _ => (Map::new(), true),
    }
}

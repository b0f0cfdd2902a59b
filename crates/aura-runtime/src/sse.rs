//! Server-sent event decoding for streamed chat completions
//!
//! Bytes arrive in arbitrary slices. Lines are buffered until complete, and
//! tool call fragments are accumulated by index until the choice finishes.

use std::collections::BTreeMap;

use aura_core::error::{AgentError, Result};
use aura_core::provider::ModelEvent;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,

    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,

    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,

    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,

    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Tool call assembled from fragments
#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Incremental decoder from raw response bytes to model events
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buffer: Vec<u8>,
    calls: BTreeMap<usize, PartialCall>,
    done: bool,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a slice of the response body
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<ModelEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            self.line(line.trim(), &mut events);
        }
        events
    }

    /// Drain whatever is left once the body ends. Always closes with `Done`.
    pub fn finish(&mut self) -> Vec<Result<ModelEvent>> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.line(line.trim(), &mut events);
        }
        if !self.done {
            self.close(&mut events);
        }
        events
    }

    fn line(&mut self, line: &str, events: &mut Vec<Result<ModelEvent>>) {
        if self.done {
            return;
        }
        // Blank lines, `event:` fields and keep-alive comments carry nothing
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.close(events);
            return;
        }

        let chunk: Chunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable stream chunk");
                return;
            }
        };

        if let Some(error) = chunk.error {
            events.push(Err(AgentError::Provider(error.message)));
            return;
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                events.push(Ok(ModelEvent::TextDelta { delta: content }));
            }
            for fragment in choice.delta.tool_calls {
                let call = self.calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    call.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        call.arguments.push_str(&arguments);
                    }
                }
            }
            if choice.finish_reason.is_some() {
                self.flush_calls(events);
            }
        }
    }

    fn close(&mut self, events: &mut Vec<Result<ModelEvent>>) {
        self.flush_calls(events);
        self.done = true;
        events.push(Ok(ModelEvent::Done));
    }

    fn flush_calls(&mut self, events: &mut Vec<Result<ModelEvent>>) {
        for (index, call) in std::mem::take(&mut self.calls) {
            if call.name.is_empty() {
                tracing::warn!(index, "Dropping tool call without a name");
                continue;
            }
            let input = if call.arguments.trim().is_empty() {
                Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(&call.arguments).unwrap_or_else(|e| {
                    tracing::warn!(
                        tool = %call.name,
                        error = %e,
                        "Tool arguments are not valid JSON, using empty input"
                    );
                    Value::Object(serde_json::Map::new())
                })
            };
            let call_id = if call.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                call.id
            };
            events.push(Ok(ModelEvent::ToolUse {
                call_id,
                name: call.name,
                input,
            }));
        }
    }
}

//! Tool System
//!
//! Tool calls as they appear in the turn log, plus the executor framework the
//! completion transport uses to run them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tools the assistant knows how to render
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    GetQuote,
    RenderChart,
    GenerateTradeReceipt,
}

impl ToolKind {
    /// Wire name the model uses when invoking the tool
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetQuote => "get_quote",
            Self::RenderChart => "render_chart",
            Self::GenerateTradeReceipt => "generate_trade_receipt",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "get_quote" => Some(Self::GetQuote),
            "render_chart" => Some(Self::RenderChart),
            "generate_trade_receipt" => Some(Self::GenerateTradeReceipt),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of a tool call. `Completed` and `Failed` are terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ToolCallState {
    Pending,
    Completed { output: serde_json::Value },
    Failed { error: String },
}

/// A single named invocation embedded in an assistant turn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Distinguishes repeated calls to the same tool
    pub call_id: String,

    pub tool_name: String,

    /// Arguments the model supplied
    #[serde(default)]
    pub input: serde_json::Value,

    #[serde(flatten)]
    pub state: ToolCallState,
}

impl ToolCall {
    pub fn pending(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            input,
            state: ToolCallState::Pending,
        }
    }

    /// Builder helper for an already-resolved call
    pub fn completed(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
    ) -> Self {
        Self {
            state: ToolCallState::Completed { output },
            ..Self::pending(call_id, tool_name, input)
        }
    }

    pub fn kind(&self) -> Option<ToolKind> {
        ToolKind::from_name(&self.tool_name)
    }

    /// Output, present only once the call has completed
    pub const fn output(&self) -> Option<&serde_json::Value> {
        match &self.state {
            ToolCallState::Completed { output } => Some(output),
            _ => None,
        }
    }

    pub const fn is_completed(&self) -> bool {
        matches!(self.state, ToolCallState::Completed { .. })
    }

    pub const fn is_terminal(&self) -> bool {
        !matches!(self.state, ToolCallState::Pending)
    }

    pub fn complete(&mut self, output: serde_json::Value) -> Result<()> {
        self.transition(ToolCallState::Completed { output })
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(ToolCallState::Failed { error: error.into() })
    }

    fn transition(&mut self, next: ToolCallState) -> Result<()> {
        if self.is_terminal() {
            return Err(AgentError::Ingest(format!(
                "tool call {} is already terminal",
                self.call_id
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    #[serde(default)]
    pub required: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl ParameterSchema {
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| serde_json::json!(v)).collect());
        self
    }
}

/// Tool definition schema (for model function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,

    /// Human-readable description (shown to the model)
    pub description: String,

    pub parameters: Vec<ParameterSchema>,

    #[serde(default)]
    pub has_side_effects: bool,
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for model function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool, producing the JSON payload stored on the call
    async fn execute(&self, input: &serde_json::Value) -> Result<serde_json::Value>;

    /// Validate arguments before execution
    fn validate(&self, input: &serde_json::Value) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            let present = input.get(&param.name).is_some_and(|v| !v.is_null());
            if param.required && !present {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Registry for available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let schema = tool.schema();
        self.tools.insert(schema.name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Validate and run a tool by name
    pub async fn execute(
        &self,
        name: &str,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        tool.validate(input)?;
        tool.execute(input).await
    }

    /// All tool schemas, sorted by name so providers see a stable order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<_> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "get_quote".into(),
                description: "Echo the ticker back".into(),
                parameters: vec![ParameterSchema::required("ticker", "string", "Ticker")],
                has_side_effects: false,
            }
        }

        async fn execute(&self, input: &serde_json::Value) -> Result<serde_json::Value> {
            Ok(json!({ "ticker": input["ticker"] }))
        }
    }

    #[test]
    fn test_kind_round_trips_wire_names() {
        for kind in [ToolKind::GetQuote, ToolKind::RenderChart, ToolKind::GenerateTradeReceipt] {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("calculate"), None);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut call = ToolCall::pending("c1", "render_chart", json!({"ticker": "AAPL"}));
        assert!(call.output().is_none());

        call.fail("timeout").unwrap();
        assert!(call.is_terminal());
        assert!(call.complete(json!({})).is_err());
        assert!(call.output().is_none());
    }

    #[test]
    fn test_call_serializes_state_inline() {
        let call = ToolCall::completed("c1", "get_quote", json!({}), json!({"price": "1"}));
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["state"], "completed");
        assert_eq!(value["output"]["price"], "1");
    }

    #[tokio::test]
    async fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["get_quote"]);

        let out = registry.execute("get_quote", &json!({"ticker": "F"})).await.unwrap();
        assert_eq!(out["ticker"], "F");

        let missing = registry.execute("get_quote", &json!({})).await;
        assert!(matches!(missing, Err(AgentError::ToolValidation(_))));

        let unknown = registry.execute("calculate", &json!({})).await;
        assert!(matches!(unknown, Err(AgentError::ToolNotFound(_))));
    }
}

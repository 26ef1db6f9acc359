//! Tool-handler contract and registry.
//!
//! Tools are the synchronous, caller-driven variant of the handler
//! contract: an orchestrating agent selects a capability by name at
//! runtime and gets a `{success, data, error}` result back. The caller
//! decides whether to retry; there is no attempt bookkeeping here.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use matterflow_core::{CancellationToken, MatterId};

/// Named input values for one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolParameters(serde_json::Map<String, JsonValue>);

impl ToolParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(JsonValue::as_str)
    }

    /// Parse a parameter as a matter id.
    pub fn matter_id(&self, name: &str) -> Result<MatterId, String> {
        let raw = self
            .str_param(name)
            .ok_or_else(|| format!("missing required parameter '{name}'"))?;
        MatterId::from_str(raw).map_err(|e| format!("invalid parameter '{name}': {e}"))
    }
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: JsonValue,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: impl Into<JsonValue>) -> Self {
        Self {
            success: true,
            data: data.into(),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: JsonValue::Null,
            error: Some(error.into()),
        }
    }
}

/// One invocable capability.
///
/// Expected failures (bad parameters, missing records) come back as a
/// failed [`ToolResult`], not as `Err`. `Err` is reserved for genuinely
/// unexpected failures, which the registry flattens so one broken tool
/// never crashes the orchestrating caller.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        params: &ToolParameters,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ToolResult>;
}

/// Explicit tool catalog, built once at process start.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        self.tools.insert(tool.name(), tool);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Invoke a tool by name. Always returns a result: unknown tools and
    /// unexpected handler failures become failed results.
    pub async fn execute(
        &self,
        name: &str,
        params: &ToolParameters,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::fail(format!("unknown tool '{name}'"));
        };
        match tool.execute(params, cancel).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = name, error = %e, "tool execution failed unexpectedly");
                ToolResult::fail(format!("tool '{name}' failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait::async_trait]
    impl ToolHandler for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn execute(
            &self,
            params: &ToolParameters,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<ToolResult> {
            match params.str_param("text") {
                Some(text) => Ok(ToolResult::ok(serde_json::json!({ "echo": text }))),
                None => Ok(ToolResult::fail("missing required parameter 'text'")),
            }
        }
    }

    struct BrokenTool;

    #[async_trait::async_trait]
    impl ToolHandler for BrokenTool {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn execute(
            &self,
            _params: &ToolParameters,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<ToolResult> {
            anyhow::bail!("wires crossed")
        }
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let registry = ToolRegistry::new().register(Arc::new(EchoTool));
        let params = ToolParameters::new().with("text", "hello");
        let result = registry
            .execute("echo", &params, &CancellationToken::new())
            .await;
        assert!(result.success);
        assert_eq!(result.data["echo"], "hello");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_result() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute("nope", &ToolParameters::new(), &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn unexpected_failure_never_escapes_the_registry() {
        let registry = ToolRegistry::new().register(Arc::new(BrokenTool));
        let result = registry
            .execute("broken", &ToolParameters::new(), &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("wires crossed"));
    }

    #[tokio::test]
    async fn missing_parameter_is_a_descriptive_failure() {
        let registry = ToolRegistry::new().register(Arc::new(EchoTool));
        let result = registry
            .execute("echo", &ToolParameters::new(), &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("text"));
    }
}

//! `ToolRegistry`/`ToolExecutor`: a name-keyed set of tools and the thin
//! wrapper the pipeline calls through (spec.md §4.12).

use std::collections::HashMap;
use std::sync::Arc;

use crate::{Tool, ToolError, ToolOutput};

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> =
            self.tools.values().map(|t| (t.name().to_string(), t.description().to_string())).collect();
        out.sort();
        out
    }
}

/// Thin executor the pipeline invokes by name; separated from
/// `ToolRegistry` so the registry can be swapped/extended without
/// touching call sites (mirrors the donor's `ToolRegistry`/`ToolExecutor`
/// split).
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub async fn execute(&self, name: &str, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let tool = self.registry.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.invoke(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its arguments back"
        }
        async fn invoke(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::ok(arguments))
        }
    }

    #[tokio::test]
    async fn executes_registered_tool_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let executor = ToolExecutor::new(Arc::new(registry));

        let output = executor.execute("echo", serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(output.content, serde_json::json!({"a": 1}));
        assert!(!output.is_error);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let executor = ToolExecutor::new(Arc::new(ToolRegistry::new()));
        let result = executor.execute("ghost", serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::NotFound(_))));
    }
}

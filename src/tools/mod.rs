//! Tool trait and catalog
//!
//! The catalog is built once at startup and never mutated; the research
//! loop dispatches into it by name.

use crate::error::AnalystError;
use crate::models::ToolSpec;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub mod news;
pub mod stock;

pub use news::{NewsSearchTool, NO_NEWS_SENTINEL};
pub use stock::{MarketDataSource, PriceBar, StockPerformanceTool, YahooChartSource};

/// Trait for a single callable capability
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the argument object
    fn parameters(&self) -> Value;
    async fn invoke(&self, arguments: &Value) -> Result<String>;
}

/// Immutable name → tool mapping
pub struct ToolCatalog {
    tools: HashMap<String, Arc<dyn Tool>>,
    specs: Vec<ToolSpec>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(tools.len());
        let mut specs = Vec::with_capacity(tools.len());

        for tool in tools {
            let name = tool.name();
            if by_name.contains_key(name) {
                return Err(AnalystError::ConfigError(format!(
                    "Tool '{}' registered twice",
                    name
                )));
            }
            specs.push(ToolSpec {
                name: name.to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            });
            by_name.insert(name.to_string(), tool);
        }

        Ok(Self {
            tools: by_name,
            specs,
        })
    }

    /// Specs in registration order, for advertising to the model
    pub fn list_specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Invoke a tool by name. Tool failures are returned untouched.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AnalystError::UnknownTool(name.to_string()))?;

        debug!(tool = name, "Invoking tool");
        tool.invoke(arguments).await
    }
}

/// Read a required, non-empty string field from a tool argument object
pub(crate) fn require_str<'a>(arguments: &'a Value, field: &str) -> Result<&'a str> {
    if !arguments.is_object() {
        return Err(AnalystError::InvalidToolInput(
            "arguments must be a JSON object".to_string(),
        ));
    }

    arguments
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AnalystError::InvalidToolInput(format!("Expected non-empty string '{}'", field))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the text argument"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }

        async fn invoke(&self, arguments: &Value) -> Result<String> {
            let text = require_str(arguments, "text")?;
            if text == "boom" {
                return Err(AnalystError::ToolError("exploded".to_string()));
            }
            Ok(text.to_string())
        }
    }

    fn catalog() -> ToolCatalog {
        ToolCatalog::new(vec![Arc::new(EchoTool)]).unwrap()
    }

    #[tokio::test]
    async fn test_invoke_by_name() {
        let result = catalog().invoke("echo", &json!({"text": "hello"})).await;
        assert_eq!(result.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = catalog().invoke("fetch_horoscope", &json!({})).await;
        assert!(matches!(result, Err(AnalystError::UnknownTool(name)) if name == "fetch_horoscope"));
    }

    #[tokio::test]
    async fn test_tool_failures_propagate() {
        let catalog = catalog();

        let failed = catalog.invoke("echo", &json!({"text": "boom"})).await;
        assert!(matches!(failed, Err(AnalystError::ToolError(_))));

        let invalid = catalog.invoke("echo", &json!("not an object")).await;
        assert!(matches!(invalid, Err(AnalystError::InvalidToolInput(_))));
    }

    #[test]
    fn test_specs_and_duplicates() {
        let catalog = catalog();
        assert_eq!(catalog.list_specs().len(), 1);
        assert_eq!(catalog.list_specs()[0].name, "echo");
        assert!(catalog.contains("echo"));

        let duplicate = ToolCatalog::new(vec![Arc::new(EchoTool), Arc::new(EchoTool)]);
        assert!(matches!(duplicate, Err(AnalystError::ConfigError(_))));
    }
}

//! Tools the model may call
//!
//! Each tool advertises a JSON-schema definition in the OpenAI function format
//! and is invoked with the arguments the model produced.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub mod greet;

pub use greet::Greet;

use crate::backend::ToolCall;
use crate::error::ToolError;

/// Function definition sent to backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Required parameter names
    pub fn required(&self) -> Vec<String> {
        self.function.parameters["required"]
            .as_array()
            .map(|names| names.iter().filter_map(|n| n.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }
}

pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-schema `properties` object
    fn parameters(&self) -> Value;

    fn call(&self, arguments: &Value) -> Result<String, ToolError>;

    /// Every declared property is required
    fn definition(&self) -> ToolDefinition {
        let properties = self.parameters();
        let required: Vec<String> = properties
            .as_object()
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();

        ToolDefinition {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }),
            },
        }
    }
}

/// The registered tools
pub struct ToolBox {
    tools: Vec<Box<dyn Tool>>,
}

impl Default for ToolBox {
    fn default() -> Self {
        Self {
            tools: vec![Box::new(Greet)],
        }
    }
}

impl ToolBox {
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Dispatch one model tool call
    pub fn call(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self.get(&call.name).ok_or_else(|| ToolError::Unknown(call.name.clone()))?;
        log::debug!("Calling tool {} with {}", call.name, call.arguments);
        tool.call(&call.arguments)
    }

    /// One `name(params): description` line per tool
    pub fn list(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| {
                let definition = tool.definition();
                format!("{}({}): {}", tool.name(), definition.required().join(", "), tool.description())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_format() {
        let definition = Greet.definition();
        let value = serde_json::to_value(&definition).unwrap();

        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "greet");
        assert_eq!(value["function"]["parameters"]["type"], "object");
        assert_eq!(value["function"]["parameters"]["required"][0], "name");
        assert_eq!(value["function"]["parameters"]["properties"]["name"]["type"], "string");
    }

    #[test]
    fn test_list() {
        let toolbox = ToolBox::default();
        assert_eq!(
            toolbox.list(),
            vec!["greet(name): An example tool that returns a greeting".to_string()]
        );
    }

    #[test]
    fn test_call_dispatch() {
        let toolbox = ToolBox::default();
        let call = ToolCall {
            name: "greet".to_string(),
            arguments: json!({"name": "Alice"}),
        };
        assert_eq!(toolbox.call(&call).unwrap(), "Hello, Alice! This is an example tool.");
    }

    #[test]
    fn test_unknown_tool() {
        let toolbox = ToolBox::default();
        let call = ToolCall {
            name: "rm_rf".to_string(),
            arguments: json!({}),
        };
        assert_eq!(toolbox.call(&call).unwrap_err(), ToolError::Unknown("rm_rf".to_string()));
    }
}

use serde_json::{Value, json};

use super::Tool;
use crate::error::ToolError;

/// Returns a greeting for the given name
pub struct Greet;

impl Tool for Greet {
    fn name(&self) -> &str {
        "greet"
    }

    fn description(&self) -> &str {
        "An example tool that returns a greeting"
    }

    fn parameters(&self) -> Value {
        json!({
            "name": {"type": "string", "description": "The name to greet"}
        })
    }

    fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let name = arguments["name"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            tool: self.name().to_string(),
            reason: "missing string argument 'name'".to_string(),
        })?;
        Ok(format!("Hello, {}! This is an example tool.", name))
    }
}

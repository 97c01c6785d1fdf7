use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: String,
    pub metadata: Value,
}

impl ToolResult {
    /// Tools mark failures by setting `error_kind` in their metadata.
    pub fn is_error(&self) -> bool {
        self.metadata
            .get("error_kind")
            .map(|v| !v.is_null())
            .unwrap_or(false)
    }
}

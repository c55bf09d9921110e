//! `tool_call` — invokes a named tool with arguments and returns its
//! result. Stands in for a real tool adapter (out of scope, §1).

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{ErrorKind, NodeError};
use crate::traits::{ExecutionContext, NodeHandler, NodeMetadata, TraceStepType};

pub struct ToolCallNode;

#[async_trait]
impl NodeHandler for ToolCallNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "Tool Call",
            category: "tool",
            retrieval_step: Some(TraceStepType::ToolCall),
            fatal_on_error: false,
        }
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        config: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, NodeError> {
        let tool_name = config
            .get("tool_name")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::new(ErrorKind::BadOutput, "tool_call requires config.tool_name"))?;

        let arguments = inputs.get("arguments").cloned().unwrap_or(Value::Object(Map::new()));

        let mut out = Map::new();
        out.insert(
            "tool_result".into(),
            json!({ "tool": tool_name, "echo": arguments }),
        );
        Ok(out)
    }
}

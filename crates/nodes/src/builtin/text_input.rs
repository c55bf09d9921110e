//! `text_input` — a root node that turns its own configuration into output.
//!
//! Typically the first node in a RAG pipeline (§8 scenario 1, node `A`).
//! Tagged `fatal_on_error` per spec §7's own example of a root input node:
//! if it fails there is nothing meaningful for the rest of the DAG to do.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::traits::{ExecutionContext, NodeHandler, NodeMetadata, TraceStepType};
use crate::error::{ErrorKind, NodeError};

pub struct TextInputNode;

#[async_trait]
impl NodeHandler for TextInputNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "Text Input",
            category: "input",
            retrieval_step: Some(TraceStepType::Input),
            fatal_on_error: true,
        }
    }

    async fn execute(
        &self,
        _inputs: Map<String, Value>,
        config: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, NodeError> {
        match config {
            Value::Object(map) => Ok(map),
            Value::String(s) => {
                let mut out = Map::new();
                out.insert("query".into(), Value::String(s));
                Ok(out)
            }
            Value::Null => Err(NodeError::new(
                ErrorKind::BadOutput,
                "text_input requires a non-null config",
            )),
            other => {
                let mut out = Map::new();
                out.insert("query".into(), other);
                Ok(out)
            }
        }
    }
}

//! `output` — terminal passthrough node; returns its collected inputs
//! unchanged so the Data Collector's merge is directly observable in the
//! final `Execution.results`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::NodeError;
use crate::traits::{ExecutionContext, NodeHandler, NodeMetadata, TraceStepType};

pub struct OutputNode;

#[async_trait]
impl NodeHandler for OutputNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "Output",
            category: "output",
            retrieval_step: Some(TraceStepType::Output),
            fatal_on_error: false,
        }
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        _config: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, NodeError> {
        Ok(inputs)
    }
}

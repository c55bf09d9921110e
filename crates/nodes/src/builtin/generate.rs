//! `generate` — produces a final answer from `query`/`context`, standing
//! in for an LLM call. Reports cost/token metadata via the well-known
//! `_meta` sub-mapping the Node Executor extracts (§4.5, §6.4).

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{ErrorKind, NodeError};
use crate::traits::{ExecutionContext, NodeHandler, NodeMetadata, TraceStepType};

pub struct GenerateNode;

#[async_trait]
impl NodeHandler for GenerateNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "Generate",
            category: "generation",
            retrieval_step: Some(TraceStepType::Generate),
            fatal_on_error: false,
        }
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        config: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, NodeError> {
        let query = inputs
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::new(ErrorKind::BadOutput, "generate requires a query input"))?;

        let context = inputs.get("context").and_then(Value::as_str).unwrap_or("");
        let model = config.get("model").and_then(Value::as_str).unwrap_or("stub-model").to_string();
        let provider = config.get("provider").and_then(Value::as_str).unwrap_or("stub").to_string();

        let response = if context.is_empty() {
            format!("answer to: {query}")
        } else {
            format!("answer to: {query} (grounded in {} chunk(s))", context.matches('[').count())
        };

        let input_tokens = (query.len() + context.len()) as u64 / 4;
        let output_tokens = response.len() as u64 / 4;

        let mut out = Map::new();
        out.insert("response".into(), Value::String(response));
        out.insert(
            "_meta".into(),
            json!({
                "cost": input_tokens as f64 * 0.000_001 + output_tokens as f64 * 0.000_002,
                "tokens": {
                    "input": input_tokens,
                    "output": output_tokens,
                    "total": input_tokens + output_tokens,
                },
                "provider": provider,
                "model": model,
            }),
        );
        Ok(out)
    }
}

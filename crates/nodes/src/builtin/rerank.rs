//! `rerank` — re-sorts retrieved results by score and optionally truncates
//! to a `top_k` from its config.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{ErrorKind, NodeError};
use crate::traits::{ExecutionContext, NodeHandler, NodeMetadata, TraceStepType};

pub struct RerankNode;

#[async_trait]
impl NodeHandler for RerankNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "Rerank",
            category: "retrieval",
            retrieval_step: Some(TraceStepType::Rerank),
            fatal_on_error: false,
        }
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        config: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, NodeError> {
        let mut results = inputs
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| NodeError::new(ErrorKind::BadOutput, "rerank requires a results input"))?;

        results.sort_by(|a, b| {
            let sa = a.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            let sb = b.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(top_k) = config.get("top_k").and_then(Value::as_u64) {
            results.truncate(top_k as usize);
        }

        let mut out = Map::new();
        out.insert("results".into(), Value::Array(results));
        Ok(out)
    }
}

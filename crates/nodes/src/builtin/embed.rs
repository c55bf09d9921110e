//! `embed` — turns a query/text string into a fixed-size vector.
//!
//! A real deployment would call an embedding provider; this handler
//! produces a small deterministic pseudo-embedding derived from the input
//! text's hash so engine tests get reproducible output without a network
//! dependency.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{ErrorKind, NodeError};
use crate::traits::{ExecutionContext, NodeHandler, NodeMetadata, TraceStepType};

pub struct EmbedNode;

const DIMS: usize = 8;

fn fake_embedding(text: &str) -> Vec<f64> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    (0..DIMS)
        .map(|i| {
            let mut hasher = DefaultHasher::new();
            (text, i).hash(&mut hasher);
            // Map the hash into a small, stable [-1, 1] float.
            ((hasher.finish() % 2000) as f64 / 1000.0) - 1.0
        })
        .collect()
}

#[async_trait]
impl NodeHandler for EmbedNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "Embed",
            category: "embedding",
            retrieval_step: Some(TraceStepType::Embed),
            fatal_on_error: false,
        }
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        _config: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, NodeError> {
        let text = inputs
            .get("query")
            .or_else(|| inputs.get("text"))
            .or_else(|| inputs.get("question"))
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::new(ErrorKind::BadOutput, "embed requires query/text/question input"))?;

        let embedding: Vec<Value> = fake_embedding(text)
            .into_iter()
            .map(|v| Value::from(v))
            .collect();

        let mut out = Map::new();
        out.insert("embedding".into(), Value::Array(embedding));
        Ok(out)
    }
}

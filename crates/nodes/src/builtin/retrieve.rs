//! `retrieve` — looks up chunks for an embedding and returns scored results.
//!
//! A real deployment would query a vector store; this handler reads a
//! small `corpus` list from its own config (or falls back to a canned
//! two-document corpus) and returns it scored in descending, deterministic
//! order, matching the shape spec §8 scenario 1 exercises.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{ErrorKind, NodeError};
use crate::traits::{ExecutionContext, NodeHandler, NodeMetadata, TraceStepType};

pub struct RetrieveNode;

#[async_trait]
impl NodeHandler for RetrieveNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "Retrieve",
            category: "retrieval",
            retrieval_step: Some(TraceStepType::Retrieve),
            fatal_on_error: false,
        }
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        config: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, NodeError> {
        if !inputs.contains_key("embedding") {
            return Err(NodeError::new(ErrorKind::BadOutput, "retrieve requires an embedding input"));
        }

        let corpus: Vec<String> = config
            .get("corpus")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .filter(|v: &Vec<String>| !v.is_empty())
            .unwrap_or_else(|| vec!["x".to_string(), "y".to_string()]);

        let n = corpus.len().max(1);
        let results: Vec<Value> = corpus
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let score = 1.0 - (i as f64 / n as f64) * 0.2;
                json!({ "text": text, "score": score })
            })
            .collect();

        let mut out = Map::new();
        out.insert("results".into(), Value::Array(results));
        Ok(out)
    }
}

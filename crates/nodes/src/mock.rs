//! `MockNode` — a test double for [`NodeHandler`].
//!
//! Useful in unit and integration tests where a real node implementation
//! is either unavailable or irrelevant.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::traits::{ExecutionContext, NodeHandler, NodeMetadata, TraceStepType};
use crate::NodeError;

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Return a specific output mapping.
    Return(Map<String, Value>),
    /// Fail with the given error.
    Fail(NodeError),
}

/// A mock node that records every call it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    pub name: String,
    pub behaviour: MockBehaviour,
    pub metadata: NodeMetadata,
    pub calls: Arc<Mutex<Vec<Map<String, Value>>>>,
}

impl MockNode {
    fn base_metadata(fatal_on_error: bool) -> NodeMetadata {
        NodeMetadata {
            display_name: "Mock",
            category: "test",
            retrieval_step: None,
            fatal_on_error,
        }
    }

    /// Create a mock that always succeeds, echoing `value` merged with
    /// `{"node": name}` so tests can trace data flow.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        let mut out = Map::new();
        out.insert("node".into(), Value::String(name.clone()));
        if let Some(obj) = value.as_object() {
            for (k, v) in obj {
                out.insert(k.clone(), v.clone());
            }
        }
        Self {
            name,
            behaviour: MockBehaviour::Return(out),
            metadata: Self::base_metadata(false),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock tagged as a retrieval-pattern node of the given step.
    pub fn returning_step(name: impl Into<String>, value: Value, step: TraceStepType) -> Self {
        let mut node = Self::returning(name, value);
        node.metadata.retrieval_step = Some(step);
        node
    }

    pub fn failing(name: impl Into<String>, err: NodeError) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::Fail(err),
            metadata: Self::base_metadata(false),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that fails and is tagged `fatal_on_error`.
    pub fn failing_fatal(name: impl Into<String>, err: NodeError) -> Self {
        let mut node = Self::failing(name, err);
        node.metadata.fatal_on_error = true;
        node
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NodeHandler for MockNode {
    fn metadata(&self) -> NodeMetadata {
        self.metadata.clone()
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        _config: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, NodeError> {
        self.calls.lock().unwrap().push(inputs);

        match &self.behaviour {
            MockBehaviour::Return(out) => Ok(out.clone()),
            MockBehaviour::Fail(err) => Err(err.clone()),
        }
    }
}

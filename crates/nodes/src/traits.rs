//! The `NodeHandler` trait — the contract every node type must fulfil.
//!
//! Defined here (in the nodes crate, below `engine` in the dependency
//! graph) so both the engine and individual node implementations can
//! import it without a circular dependency — mirrors where the teacher
//! kept `ExecutableNode`/`ExecutionContext`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::NodeError;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation signal shared by every node in one execution.
///
/// Backed by a `watch` channel rather than `tokio_util::sync::CancellationToken`
/// so the engine doesn't need an extra dependency for a single bool flag.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

/// The orchestrator-side handle used to signal cancellation.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Create a linked (handle, token) pair for one execution.
pub fn cancellation_pair() -> (CancellationHandle, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx: Arc::new(tx) }, CancellationToken { rx })
}

impl CancellationHandle {
    /// Signal cancellation to every token cloned from the paired receiver.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been signalled. A handler awaiting
    /// I/O can `tokio::select!` this against its own future to observe
    /// cancellation at an I/O boundary, per §5.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        // `changed` only errors if every sender was dropped, which means
        // cancellation can never occur; an unfinished await is then correct.
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// A single `node_progress` payload a handler may emit any number of times.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProgressUpdate {
    pub fraction: Option<f64>,
    pub message: Option<String>,
    pub partial: Option<Value>,
}

/// Handle a node handler uses to publish progress. Cloneable and cheap;
/// publishing after the receiving side has gone away is a silent no-op —
/// the executor has already moved on to close the span.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, update: ProgressUpdate) {
        let _ = self.tx.send(update);
    }

    pub fn emit_fraction(&self, fraction: f64) {
        self.emit(ProgressUpdate { fraction: Some(fraction), ..Default::default() });
    }

    pub fn emit_message(&self, message: impl Into<String>) {
        self.emit(ProgressUpdate { message: Some(message.into()), ..Default::default() });
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Read-only lookup handed to node handlers through the context (§6.6).
/// The engine never logs or digests the values behind this trait.
pub trait SecretsLookup: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Simple in-memory secrets table, sufficient for tests and for callers
/// that resolve secrets themselves before submitting the workflow.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets(pub HashMap<String, String>);

impl SecretsLookup for StaticSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

// ---------------------------------------------------------------------------
// Execution context (per-node invocation view)
// ---------------------------------------------------------------------------

/// Everything a node handler receives alongside its inputs and config.
///
/// Constructed fresh by the engine for each node dispatch; never mutated
/// in place and never a process-wide singleton (§9 Design Notes).
#[derive(Clone)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub execution_id: Uuid,
    pub node_id: String,
    pub cancellation: CancellationToken,
    pub progress: ProgressSink,
    pub secrets: Arc<dyn SecretsLookup>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("workflow_id", &self.workflow_id)
            .field("execution_id", &self.execution_id)
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Step classification for the retrieval-oriented `QueryTrace` (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStepType {
    Input,
    Embed,
    Retrieve,
    Rerank,
    Generate,
    ToolCall,
    Output,
    Other,
}

/// Static introspection data the registry consults for validation,
/// tracing, and the fatal-on-error propagation policy (§4.1, §7).
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub display_name: &'static str,
    pub category: &'static str,
    /// `Some(_)` marks this node type as a retrieval-pattern
    /// producer/consumer that participates in the `QueryTrace`.
    pub retrieval_step: Option<TraceStepType>,
    /// Failure of this node type transitions the whole execution to
    /// `failed` rather than staying node-local (§7).
    pub fatal_on_error: bool,
}

// ---------------------------------------------------------------------------
// NodeHandler
// ---------------------------------------------------------------------------

/// The core node trait (§6.1). All built-in nodes and future plugin
/// implementations must implement this.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// JSON-shaped contract used for validation and digests only — never
    /// strictly enforced against actual inputs (§4.1).
    fn input_schema(&self) -> Value {
        Value::Object(Map::new())
    }

    fn output_schema(&self) -> Value {
        Value::Object(Map::new())
    }

    fn metadata(&self) -> NodeMetadata;

    /// Execute the node. `inputs` is the mapping the Data Collector
    /// assembled from upstream results; `config` is this node's own
    /// configuration. The handler must observe `context.cancellation` at
    /// I/O boundaries and must never swallow it.
    async fn execute(
        &self,
        inputs: Map<String, Value>,
        config: Value,
        context: &ExecutionContext,
    ) -> Result<Map<String, Value>, NodeError>;
}

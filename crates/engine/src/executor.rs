//! Node Executor (§4.5) — runs one node handler to completion, wrapping
//! it with span lifecycle, input redaction, cancellation/timeout
//! enforcement, and `_meta` cost/token extraction.
//!
//! Grounded on the teacher's `WorkflowExecutor::execute_with_retry`
//! shape (dispatch one node, capture timing, map errors) with the
//! retry/backoff loop removed — the engine does not retry (§4.5, §1
//! non-goals) — and cancellation/timeout added per §5.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use nodes::{ExecutionContext, NodeHandler, ProgressSink, SecretsLookup};

use crate::context::RunContext;
use crate::error::NodeFailure;
use crate::formatter::FormatterRegistry;
use crate::models::{Cost, Node, NodeResult, NodeStatus, SpanDescriptor, SpanStatus, TokenUsage};
use crate::redact;
use crate::stream::{Event, StreamBus};
use crate::tracing::SpanSink;

pub struct NodeExecutor<'a> {
    formatters: &'a FormatterRegistry,
    span_sink: &'a dyn SpanSink,
    stream: &'a StreamBus,
}

impl<'a> NodeExecutor<'a> {
    pub fn new(formatters: &'a FormatterRegistry, span_sink: &'a dyn SpanSink, stream: &'a StreamBus) -> Self {
        Self { formatters, span_sink, stream }
    }

    /// Run `handler` for `node` with the already-collected `inputs`.
    /// Always closes the span it opens, including on timeout.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        node: &Node,
        handler: Arc<dyn NodeHandler>,
        inputs: Map<String, Value>,
        workflow_id: &str,
        execution_id: Uuid,
        run_ctx: &RunContext,
        root_span_id: Uuid,
        timeout: Option<Duration>,
    ) -> NodeResult {
        let started_at = Utc::now();
        let span_id = self.span_sink.start(SpanDescriptor {
            name: node.node_type.clone(),
            span_type: "node".to_string(),
            parent_span_id: Some(root_span_id),
        });

        self.span_sink.add_attribute(span_id, "node.id", Value::String(node.id.clone()));
        self.span_sink.add_attribute(span_id, "node.type", Value::String(node.node_type.clone()));
        self.span_sink.add_attribute(span_id, "config.digest", Value::String(redact::digest(&node.config)));
        self.span_sink.add_attribute(
            span_id,
            "inputs.digest",
            Value::String(redact::digest(&Value::Object(inputs.clone()))),
        );

        let (progress, mut progress_rx) = ProgressSink::new();
        let exec_ctx = ExecutionContext {
            workflow_id: workflow_id.to_string(),
            execution_id,
            node_id: node.id.clone(),
            cancellation: run_ctx.cancellation.clone(),
            progress,
            secrets: run_ctx.secrets.clone() as Arc<dyn SecretsLookup>,
        };

        let config = node.config.clone();
        let handler_fut = handler.execute(inputs, config, &exec_ctx);
        tokio::pin!(handler_fut);

        let sleep_fut = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(sleep_fut);

        let outcome = loop {
            tokio::select! {
                result = &mut handler_fut => break result,
                _ = &mut sleep_fut => {
                    break Err(nodes::NodeError::timeout(format!(
                        "node '{}' exceeded its configured timeout of {timeout:?}",
                        node.id
                    )));
                }
                Some(update) = progress_rx.recv() => {
                    self.stream
                        .publish(
                            execution_id,
                            Event::NodeProgress {
                                execution_id,
                                node_id: node.id.clone(),
                                fraction: update.fraction,
                                message: update.message,
                                partial: update.partial,
                            },
                        )
                        .await;
                }
            }
        };

        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0);

        match outcome {
            Ok(raw_output) => {
                let formatted = self.formatters.format(&node.node_type, &raw_output);
                let (cost, tokens, _provider, _model) = extract_meta(&formatted);

                self.span_sink.add_attribute(span_id, "cost", Value::from(cost.to_f64()));
                self.span_sink.add_attribute(span_id, "tokens.total", Value::from(tokens.total));
                self.span_sink.add_attribute(span_id, "duration_ms", Value::from(duration_ms));
                self.span_sink.end(span_id, SpanStatus::Ok);

                NodeResult {
                    node_id: node.id.clone(),
                    status: NodeStatus::Completed,
                    output: formatted,
                    error: None,
                    cost,
                    tokens,
                    started_at,
                    completed_at: Some(completed_at),
                    span_id: Some(span_id),
                }
            }
            Err(node_error) => {
                let failure = NodeFailure::from(node_error);
                self.span_sink.add_attribute(span_id, "error.kind", Value::String(format!("{:?}", failure.kind)));
                self.span_sink.end(span_id, SpanStatus::Error);

                NodeResult {
                    node_id: node.id.clone(),
                    status: NodeStatus::Failed,
                    output: Map::new(),
                    error: Some(failure),
                    cost: Cost::ZERO,
                    tokens: TokenUsage::default(),
                    started_at,
                    completed_at: Some(completed_at),
                    span_id: Some(span_id),
                }
            }
        }
    }
}

/// Extracts `cost`/`tokens`/`provider`/`model` from the well-known
/// `_meta` sub-mapping a handler may return; absent or malformed `_meta`
/// means zero cost (§4.5).
pub fn extract_meta(output: &Map<String, Value>) -> (Cost, TokenUsage, Option<String>, Option<String>) {
    let Some(meta) = output.get("_meta").and_then(Value::as_object) else {
        return (Cost::ZERO, TokenUsage::default(), None, None);
    };

    let cost = meta.get("cost").and_then(Value::as_f64).map(Cost::from_f64).unwrap_or(Cost::ZERO);
    let tokens = meta
        .get("tokens")
        .and_then(|t| serde_json::from_value::<TokenUsage>(t.clone()).ok())
        .unwrap_or_default();
    let provider = meta.get("provider").and_then(Value::as_str).map(String::from);
    let model = meta.get("model").and_then(Value::as_str).map(String::from);

    (cost, tokens, provider, model)
}

//! Engine Orchestrator (§4.9) — wires the Validator, Data Collector,
//! Node Executor, Tracing, Cost Tracker, and Stream Bus into the
//! top-level `run(workflow) -> Execution` procedure.
//!
//! Dispatch is sequential, one node at a time in plan order — `P = 1`,
//! which §5 explicitly blesses as conformant. `RunContext::concurrency`
//! is accepted and stored but not yet wired to a bounded-parallel
//! scheduler; see DESIGN.md for why that's a named gap rather than a
//! half-built one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::collector::{DataCollector, FieldMappingTable};
use crate::context::RunContext;
use crate::cost::{CostSink, CostTracker, NoopCostSink};
use crate::error::{ExecutionErrorRecord, ValidationError};
use crate::executor::{self, NodeExecutor};
use crate::formatter::FormatterRegistry;
use crate::models::{Execution, ExecutionStatus, Node, NodeResult, NodeStatus, SpanDescriptor, SpanStatus, TraceStep, Workflow};
use crate::redact;
use crate::registry::NodeRegistry;
use crate::stream::{Event, StreamBus};
use crate::tracing::{append_trace_step, SpanSink, TracingSpanSink};
use crate::validator;

pub struct Engine {
    registry: NodeRegistry,
    formatters: FormatterRegistry,
    field_mapping: FieldMappingTable,
    span_sink: Box<dyn SpanSink>,
    cost_sink: Box<dyn CostSink>,
    stream: StreamBus,
}

impl Engine {
    pub fn new(registry: NodeRegistry) -> Self {
        Self {
            registry,
            formatters: FormatterRegistry::new(),
            field_mapping: FieldMappingTable::builtin(),
            span_sink: Box::new(TracingSpanSink),
            cost_sink: Box::new(NoopCostSink),
            stream: StreamBus::new(),
        }
    }

    pub fn with_formatters(mut self, formatters: FormatterRegistry) -> Self {
        self.formatters = formatters;
        self
    }

    pub fn with_field_mapping(mut self, table: FieldMappingTable) -> Self {
        self.field_mapping = table;
        self
    }

    pub fn with_span_sink(mut self, sink: Box<dyn SpanSink>) -> Self {
        self.span_sink = sink;
        self
    }

    pub fn with_cost_sink(mut self, sink: Box<dyn CostSink>) -> Self {
        self.cost_sink = sink;
        self
    }

    pub fn stream(&self) -> &StreamBus {
        &self.stream
    }

    /// Top-level procedure (§4.9), assigning a fresh execution id.
    pub async fn run(&self, workflow: &Workflow, run_ctx: RunContext) -> Execution {
        self.run_with_id(Uuid::new_v4(), workflow, run_ctx).await
    }

    /// Same as [`Engine::run`], but with a caller-supplied execution id.
    /// Lets a caller `StreamBus::subscribe` to the run's events before
    /// submitting it for execution, since the id is otherwise only known
    /// once the run has already finished.
    pub async fn run_with_id(&self, execution_id: Uuid, workflow: &Workflow, run_ctx: RunContext) -> Execution {
        let started_at = Utc::now();

        let root_span_id = self.span_sink.start(SpanDescriptor {
            name: format!("execution:{}", workflow.id),
            span_type: "execution".to_string(),
            parent_span_id: None,
        });

        self.stream
            .publish(
                execution_id,
                Event::ExecutionStarted {
                    execution_id,
                    workflow_id: workflow.id.clone(),
                    started_at,
                    node_count: workflow.nodes.len(),
                },
            )
            .await;

        let mut execution = Execution::new(execution_id, workflow.id.clone(), started_at);

        if let Err(err) = validator::validate(workflow, &self.registry) {
            tracing::warn!(workflow_id = %workflow.id, %err, "workflow failed validation");
            return self.finish_with_validation_error(execution, &err, root_span_id).await;
        }

        let plan = match validator::plan(workflow) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(workflow_id = %workflow.id, %err, "workflow plan failed");
                return self.finish_with_validation_error(execution, &err, root_span_id).await;
            }
        };

        let node_index: HashMap<&str, &Node> = workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let collector = DataCollector::new(workflow, &self.formatters, self.field_mapping.clone());
        let node_executor = NodeExecutor::new(&self.formatters, self.span_sink.as_ref(), &self.stream);
        let cost_tracker = CostTracker::new(self.cost_sink.as_ref());

        let mut fatally_failed = false;
        let mut unreachable: HashSet<String> = HashSet::new();

        for node_id in &plan {
            if run_ctx.cancellation.is_cancelled() {
                self.skip_remaining(&mut execution, &plan, node_id, execution_id, "canceled").await;
                break;
            }

            if unreachable.contains(node_id) {
                self.mark_skipped(&mut execution, node_id, execution_id, "upstream_fatal_failure").await;
                continue;
            }

            let node = node_index.get(node_id.as_str()).expect("plan only names nodes present in the workflow");

            let inputs = match collector.collect_inputs(node_id, &node.node_type, &execution.results, run_ctx.intelligent_routing) {
                Ok(inputs) => inputs,
                Err(_missing) => {
                    self.mark_skipped(&mut execution, node_id, execution_id, "missing_input").await;
                    continue;
                }
            };

            let handler = self.registry.get(&node.node_type).expect("validate() confirmed this node type is registered");
            let inputs_digest = redact::digest(&Value::Object(inputs.clone()));

            self.stream
                .publish(
                    execution_id,
                    Event::NodeStarted {
                        execution_id,
                        node_id: node_id.clone(),
                        node_type: node.node_type.clone(),
                        started_at: Utc::now(),
                        span_id: root_span_id,
                    },
                )
                .await;

            let result = node_executor
                .execute(node, handler, inputs, &workflow.id, execution_id, &run_ctx, root_span_id, node_timeout(&node.config))
                .await;

            self.record_terminal_node(
                &mut execution,
                workflow,
                node,
                result,
                execution_id,
                root_span_id,
                &inputs_digest,
                &cost_tracker,
                &mut fatally_failed,
                &mut unreachable,
            )
            .await;
        }

        execution.recompute_totals();
        execution.completed_at = Some(Utc::now());
        execution.status = if run_ctx.cancellation.is_cancelled() {
            ExecutionStatus::Canceled
        } else if fatally_failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };

        self.finish(execution, root_span_id, execution_id).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_terminal_node(
        &self,
        execution: &mut Execution,
        workflow: &Workflow,
        node: &Node,
        result: NodeResult,
        execution_id: Uuid,
        root_span_id: Uuid,
        inputs_digest: &str,
        cost_tracker: &CostTracker<'_>,
        fatally_failed: &mut bool,
        unreachable: &mut HashSet<String>,
    ) {
        let duration_ms = result
            .completed_at
            .map(|completed| (completed - result.started_at).num_milliseconds())
            .unwrap_or(0);

        if let Some(step_type) = self.registry.metadata(&node.node_type).and_then(|m| m.retrieval_step) {
            append_trace_step(
                execution,
                TraceStep {
                    span_id: result.span_id.unwrap_or(root_span_id),
                    step_type,
                    started_at: result.started_at,
                    duration_ms,
                    inputs_digest: inputs_digest.to_string(),
                    outputs_digest: redact::digest(&Value::Object(result.output.clone())),
                    node_id: node.id.clone(),
                    parent_span_id: Some(root_span_id),
                },
            );
        }

        match result.status {
            NodeStatus::Completed => {
                let (_, _, provider, model) = executor::extract_meta(&result.output);
                cost_tracker.track(
                    execution_id,
                    &workflow.id,
                    &node.id,
                    &node.node_type,
                    result.cost,
                    result.tokens,
                    provider,
                    model,
                );

                self.stream
                    .publish(
                        execution_id,
                        Event::NodeCompleted {
                            execution_id,
                            node_id: node.id.clone(),
                            duration_ms,
                            cost: result.cost,
                            tokens_total: result.tokens.total,
                            output_digest: redact::digest(&Value::Object(result.output.clone())),
                        },
                    )
                    .await;
            }
            NodeStatus::Failed => {
                let failure = result.error.clone().expect("failed NodeResult always carries an error");
                execution.errors.push(ExecutionErrorRecord::from_node_failure(node.id.clone(), &failure));

                self.stream
                    .publish(
                        execution_id,
                        Event::NodeFailed {
                            execution_id,
                            node_id: node.id.clone(),
                            error_kind: failure.kind,
                            message: failure.message.clone(),
                        },
                    )
                    .await;

                // Non-fatal failures are left for the Data Collector to route around
                // (another direct source, or an indirect ancestor, may still satisfy a
                // downstream node's required fields). Only a fatal failure forces its
                // whole subtree to be skipped outright.
                if self.registry.metadata(&node.node_type).map(|m| m.fatal_on_error).unwrap_or(false) {
                    *fatally_failed = true;
                    mark_descendants_unreachable(workflow, &node.id, unreachable);
                }
            }
            _ => {}
        }

        execution.results.insert(node.id.clone(), result);
    }

    async fn mark_skipped(&self, execution: &mut Execution, node_id: &str, execution_id: Uuid, reason: &str) {
        let now = Utc::now();
        let mut result = NodeResult::pending(node_id, now);
        result.status = NodeStatus::Skipped;
        result.completed_at = Some(now);
        execution.results.insert(node_id.to_string(), result);

        self.stream
            .publish(execution_id, Event::NodeSkipped { execution_id, node_id: node_id.to_string(), reason: reason.to_string() })
            .await;
    }

    async fn skip_remaining(&self, execution: &mut Execution, plan: &[String], from_node_id: &str, execution_id: Uuid, reason: &str) {
        let start = plan.iter().position(|n| n == from_node_id).unwrap_or(0);
        for node_id in &plan[start..] {
            if !execution.results.contains_key(node_id) {
                self.mark_skipped(execution, node_id, execution_id, reason).await;
            }
        }
    }

    async fn finish_with_validation_error(&self, mut execution: Execution, err: &ValidationError, root_span_id: Uuid) -> Execution {
        execution.status = ExecutionStatus::Failed;
        execution.errors.push(ExecutionErrorRecord::from_validation(err));
        let execution_id = execution.execution_id;
        self.finish(execution, root_span_id, execution_id).await
    }

    async fn finish(&self, mut execution: Execution, root_span_id: Uuid, execution_id: Uuid) -> Execution {
        if execution.completed_at.is_none() {
            execution.completed_at = Some(Utc::now());
        }

        self.span_sink.end(root_span_id, if execution.status == ExecutionStatus::Completed { SpanStatus::Ok } else { SpanStatus::Error });

        let duration_ms = duration_since(execution.started_at, execution.completed_at.unwrap());
        self.stream
            .publish(
                execution_id,
                Event::ExecutionCompleted { execution_id, status: execution.status, total_cost: execution.total_cost, duration_ms },
            )
            .await;
        self.stream.close(execution_id);

        execution
    }
}

fn duration_since(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> i64 {
    (completed_at - started_at).num_milliseconds().max(0)
}

/// A node may carry a handler-specific `timeout_ms` in its `config`
/// object; the engine treats it as an opaque number, not a policy it
/// imposes by default (§9 Open Question 3 — see DESIGN.md).
fn node_timeout(config: &Value) -> Option<Duration> {
    config.get("timeout_ms")?.as_u64().map(Duration::from_millis)
}

/// BFS over the workflow's forward edges, marking every node reachable
/// from `node_id` as unreachable (§4.9 step 4e / §7 fatal propagation).
fn mark_descendants_unreachable(workflow: &Workflow, node_id: &str, unreachable: &mut HashSet<String>) {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &workflow.edges {
        children.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
    }

    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(node_id);
    while let Some(current) = queue.pop_front() {
        if let Some(kids) = children.get(current) {
            for &kid in kids {
                if unreachable.insert(kid.to_string()) {
                    queue.push_back(kid);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Edge;
    use nodes::mock::MockNode;
    use nodes::{cancellation_pair, NodeError, TraceStepType};
    use serde_json::json;
    use std::sync::Arc;

    fn node(id: &str, node_type: &str) -> Node {
        Node { id: id.into(), node_type: node_type.into(), config: Value::Null }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge { source: source.into(), target: target.into(), source_handle: None, target_handle: None }
    }

    fn workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        Workflow { id: "wf".into(), nodes, edges }
    }

    #[tokio::test]
    async fn linear_workflow_completes_and_totals_cost() {
        let wf = workflow(
            vec![node("a", "mock_a"), node("b", "mock_b")],
            vec![edge("a", "b")],
        );
        let mut registry = NodeRegistry::new();
        registry.register(
            "mock_a",
            Arc::new(MockNode::returning("a", json!({ "query": "hi", "_meta": {"cost": 0.01, "tokens": {"input":1,"output":1,"total":2}} }))),
        );
        registry.register("mock_b", Arc::new(MockNode::returning("b", json!({ "query": "hi" }))));

        let engine = Engine::new(registry);
        let (_handle, token) = cancellation_pair();
        let execution = engine.run(&wf, RunContext::new(token)).await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.results.len(), 2);
        assert_eq!(execution.results["a"].status, NodeStatus::Completed);
        assert_eq!(execution.results["b"].status, NodeStatus::Completed);
        assert_eq!(execution.total_cost.to_f64(), 0.01);
    }

    #[tokio::test]
    async fn failed_direct_source_causes_downstream_skip_via_missing_input() {
        let wf = workflow(vec![node("a", "failing"), node("b", "mock_b")], vec![edge("a", "b")]);
        let mut registry = NodeRegistry::new();
        registry.register("failing", Arc::new(MockNode::failing("a", NodeError::provider("boom"))));
        registry.register("mock_b", Arc::new(MockNode::returning("b", json!({}))));

        let mut table = FieldMappingTable::new();
        table.register(
            "mock_b",
            vec![crate::collector::FieldRule {
                target_field: "query",
                candidate_source_fields: &["query"],
                strategy: crate::collector::MergeStrategy::Scalar,
                required: true,
            }],
        );

        let engine = Engine::new(registry).with_field_mapping(table);
        let (_handle, token) = cancellation_pair();
        let execution = engine.run(&wf, RunContext::new(token)).await;

        assert_eq!(execution.results["a"].status, NodeStatus::Failed);
        assert_eq!(execution.results["b"].status, NodeStatus::Skipped);
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn fatal_node_failure_marks_execution_failed_and_skips_descendants_only() {
        let wf = workflow(
            vec![node("root", "fatal"), node("dependent", "mock_b"), node("independent", "mock_c")],
            vec![edge("root", "dependent")],
        );
        let mut registry = NodeRegistry::new();
        registry.register("fatal", Arc::new(MockNode::failing_fatal("root", NodeError::internal("boom"))));
        registry.register("mock_b", Arc::new(MockNode::returning("dependent", json!({}))));
        registry.register("mock_c", Arc::new(MockNode::returning("independent", json!({}))));

        let engine = Engine::new(registry);
        let (_handle, token) = cancellation_pair();
        let execution = engine.run(&wf, RunContext::new(token)).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.results["root"].status, NodeStatus::Failed);
        assert_eq!(execution.results["dependent"].status, NodeStatus::Skipped);
        assert_eq!(execution.results["independent"].status, NodeStatus::Completed);
    }

    #[tokio::test]
    async fn cancellation_before_start_skips_every_node() {
        let wf = workflow(vec![node("a", "mock_a")], vec![]);
        let mut registry = NodeRegistry::new();
        registry.register("mock_a", Arc::new(MockNode::returning("a", json!({}))));

        let engine = Engine::new(registry);
        let (handle, token) = cancellation_pair();
        handle.cancel();
        let execution = engine.run(&wf, RunContext::new(token)).await;

        assert_eq!(execution.status, ExecutionStatus::Canceled);
        assert_eq!(execution.results["a"].status, NodeStatus::Skipped);
    }

    #[tokio::test]
    async fn cyclic_workflow_fails_validation_with_no_results() {
        let wf = workflow(vec![node("a", "mock_a"), node("b", "mock_b")], vec![edge("a", "b"), edge("b", "a")]);
        let mut registry = NodeRegistry::new();
        registry.register("mock_a", Arc::new(MockNode::returning("a", json!({}))));
        registry.register("mock_b", Arc::new(MockNode::returning("b", json!({}))));

        let engine = Engine::new(registry);
        let (_handle, token) = cancellation_pair();
        let execution = engine.run(&wf, RunContext::new(token)).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.results.is_empty());
        assert_eq!(execution.errors.len(), 1);
    }

    #[tokio::test]
    async fn query_trace_is_built_only_for_retrieval_step_nodes() {
        let wf = workflow(vec![node("a", "plain"), node("b", "retrieval")], vec![edge("a", "b")]);
        let mut registry = NodeRegistry::new();
        registry.register("plain", Arc::new(MockNode::returning("a", json!({ "query": "hi" }))));
        registry.register("retrieval", Arc::new(MockNode::returning_step("b", json!({}), TraceStepType::Embed)));

        let mut table = FieldMappingTable::new();
        table.register(
            "retrieval",
            vec![crate::collector::FieldRule {
                target_field: "query",
                candidate_source_fields: &["query"],
                strategy: crate::collector::MergeStrategy::Scalar,
                required: false,
            }],
        );

        let engine = Engine::new(registry).with_field_mapping(table);
        let (_handle, token) = cancellation_pair();
        let execution = engine.run(&wf, RunContext::new(token)).await;

        let trace = execution.query_trace.expect("retrieval node should produce a query trace");
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].node_id, "b");
    }

    #[tokio::test]
    async fn timeout_ms_in_node_config_is_enforced_by_the_executor() {
        use async_trait::async_trait;
        use nodes::{ExecutionContext, NodeHandler};

        struct SlowNode;
        #[async_trait]
        impl NodeHandler for SlowNode {
            fn metadata(&self) -> nodes::NodeMetadata {
                nodes::NodeMetadata { display_name: "slow", category: "test", retrieval_step: None, fatal_on_error: false }
            }
            async fn execute(
                &self,
                _inputs: serde_json::Map<String, Value>,
                _config: Value,
                _ctx: &ExecutionContext,
            ) -> Result<serde_json::Map<String, Value>, NodeError> {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(serde_json::Map::new())
            }
        }

        let mut slow_node = node("slow", "slow_type");
        slow_node.config = json!({ "timeout_ms": 5 });
        let wf = workflow(vec![slow_node], vec![]);

        let mut registry = NodeRegistry::new();
        registry.register("slow_type", Arc::new(SlowNode));

        let engine = Engine::new(registry);
        let (_handle, token) = cancellation_pair();
        let execution = engine.run(&wf, RunContext::new(token)).await;

        assert_eq!(execution.results["slow"].status, NodeStatus::Failed);
        assert_eq!(
            execution.results["slow"].error.as_ref().unwrap().kind,
            crate::error::ExecutionErrorKind::Timeout
        );
    }

    #[tokio::test]
    async fn intelligent_routing_flag_threads_through_to_collected_inputs() {
        use nodes::NodeHandler;

        let wf = workflow(
            vec![node("root", "mock_root"), node("target", "mock_b")],
            vec![edge("root", "target")],
        );
        let mut registry = NodeRegistry::new();
        registry.register(
            "mock_root",
            Arc::new(MockNode::returning("root", json!({ "query": "hi", "extra": "field" }))),
        );
        let target_handler = Arc::new(MockNode::returning("target", json!({})));
        registry.register("mock_b", target_handler.clone() as Arc<dyn NodeHandler>);

        let engine = Engine::new(registry);
        let (_handle, token) = cancellation_pair();
        let run_ctx = RunContext::new(token).with_intelligent_routing(true);
        let execution = engine.run(&wf, run_ctx).await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        let calls = target_handler.calls.lock().unwrap();
        assert_eq!(calls[0]["root.query"], json!("hi"));
        assert_eq!(calls[0]["root.extra"], json!("field"));
    }
}

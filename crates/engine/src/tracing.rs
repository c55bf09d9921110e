//! Tracing (§4.6) — two parallel facilities: generic observability spans
//! via an abstract [`SpanSink`], and the retrieval-oriented [`QueryTrace`]
//! the orchestrator assembles as retrieval-pattern nodes terminate.

use serde_json::Value;
use uuid::Uuid;

use crate::models::{Execution, QueryTrace, SpanDescriptor, SpanStatus, TraceStep};

/// `start -> (add_attributes)* -> end` per span (§4.6 state machine). Must
/// be safe for concurrent emission across executions (§5).
pub trait SpanSink: Send + Sync {
    fn start(&self, descriptor: SpanDescriptor) -> Uuid;
    fn add_attribute(&self, span_id: Uuid, key: &str, value: Value);
    fn end(&self, span_id: Uuid, status: SpanStatus);
}

/// Forwards to the `tracing` crate (ambient stack requirement — §9). This
/// is a separate concept from `tracing::Span`: it's the engine's own
/// seam, which happens to default to logging through it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSpanSink;

impl SpanSink for TracingSpanSink {
    fn start(&self, descriptor: SpanDescriptor) -> Uuid {
        let span_id = Uuid::new_v4();
        tracing::info!(
            %span_id,
            name = %descriptor.name,
            span_type = %descriptor.span_type,
            parent_span_id = ?descriptor.parent_span_id,
            "span started"
        );
        span_id
    }

    fn add_attribute(&self, span_id: Uuid, key: &str, value: Value) {
        tracing::debug!(%span_id, key, %value, "span attribute");
    }

    fn end(&self, span_id: Uuid, status: SpanStatus) {
        match status {
            SpanStatus::Ok => tracing::info!(%span_id, "span ended ok"),
            SpanStatus::Error => tracing::warn!(%span_id, "span ended with error"),
        }
    }
}

/// The engine tolerates a no-op span sink (§6 interface 3); used in tests
/// and by callers that don't want observability wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSpanSink;

impl SpanSink for NoopSpanSink {
    fn start(&self, _descriptor: SpanDescriptor) -> Uuid {
        Uuid::new_v4()
    }
    fn add_attribute(&self, _span_id: Uuid, _key: &str, _value: Value) {}
    fn end(&self, _span_id: Uuid, _status: SpanStatus) {}
}

/// Appends a trace step, lazily initialising `Execution::query_trace` on
/// the first retrieval-pattern node to terminate (§4.6 — built only when
/// the workflow contains at least one such node).
pub fn append_trace_step(execution: &mut Execution, step: TraceStep) {
    execution.query_trace.get_or_insert_with(|| QueryTrace { steps: Vec::new() }).steps.push(step);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn noop_sink_still_produces_distinct_span_ids() {
        let sink = NoopSpanSink;
        let a = sink.start(SpanDescriptor { name: "a".into(), span_type: "node".into(), parent_span_id: None });
        let b = sink.start(SpanDescriptor { name: "b".into(), span_type: "node".into(), parent_span_id: None });
        assert_ne!(a, b);
    }

    #[test]
    fn trace_steps_accumulate_in_append_order() {
        let mut execution = Execution::new(Uuid::new_v4(), "wf", Utc::now());
        assert!(execution.query_trace.is_none());

        let step = |node_id: &str| TraceStep {
            span_id: Uuid::new_v4(),
            step_type: nodes::TraceStepType::Embed,
            started_at: Utc::now(),
            duration_ms: 1,
            inputs_digest: "{}".into(),
            outputs_digest: "{}".into(),
            node_id: node_id.to_string(),
            parent_span_id: None,
        };

        append_trace_step(&mut execution, step("a"));
        append_trace_step(&mut execution, step("b"));

        let trace = execution.query_trace.as_ref().unwrap();
        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps[0].node_id, "a");
        assert_eq!(trace.steps[1].node_id, "b");
    }
}

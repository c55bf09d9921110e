//! Core domain models for the workflow engine (§3).
//!
//! These types are the source of truth for what a workflow, a node
//! result, and an execution look like in memory. They serialise to/from
//! the JSON-compatible formats §6.7/§6.8 specify; the engine never
//! persists them itself.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow / Node / Edge
// ---------------------------------------------------------------------------

/// A complete, immutable-for-the-duration-of-one-execution workflow
/// definition (§3, §6.7): `{id, nodes: [{id, type, config}], edges: [{source,
/// target, source_handle?, target_handle?}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// A single node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A directed dependency between two nodes, with optional named ports
/// used by the Data Collector for handle-based routing (§4.4 rule 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

// ---------------------------------------------------------------------------
// Cost
// ---------------------------------------------------------------------------

/// A non-negative rational cost, represented as fixed-point micro-units
/// (1e-8 scale) rather than a floating-point number so repeated summation
/// across concurrent nodes never drifts (§8 "Cost conservation"). Encoded
/// to/from a JSON number with up to 8 fractional digits per §6.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Cost(i64);

impl Cost {
    pub const ZERO: Cost = Cost(0);

    pub fn from_f64(value: f64) -> Self {
        Cost((value.max(0.0) * 1e8).round() as i64)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 1e8
    }
}

impl std::ops::Add for Cost {
    type Output = Cost;
    fn add(self, rhs: Self) -> Cost {
        Cost(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Cost {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Cost {
        iter.fold(Cost::ZERO, |acc, c| acc + c)
    }
}

impl Serialize for Cost {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Cost {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Ok(Cost::from_f64(value))
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;
    fn add(self, rhs: Self) -> TokenUsage {
        TokenUsage {
            input: self.input + rhs.input,
            output: self.output + rhs.output,
            total: self.total + rhs.total,
        }
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> TokenUsage {
        iter.fold(TokenUsage::default(), |acc, t| acc + t)
    }
}

// ---------------------------------------------------------------------------
// NodeResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Terminal (or in-flight) record of one node's execution (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub output: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::error::NodeFailure>,
    pub cost: Cost,
    pub tokens: TokenUsage,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<Uuid>,
}

impl NodeResult {
    pub fn pending(node_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeStatus::Pending,
            output: serde_json::Map::new(),
            error: None,
            cost: Cost::ZERO,
            tokens: TokenUsage::default(),
            started_at,
            completed_at: None,
            span_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped)
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Canceled,
}

/// The full record of a single workflow run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub results: HashMap<String, NodeResult>,
    pub total_cost: Cost,
    pub total_tokens: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_trace: Option<QueryTrace>,
    pub errors: Vec<crate::error::ExecutionErrorRecord>,
}

impl Execution {
    pub fn new(execution_id: Uuid, workflow_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            execution_id,
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            started_at,
            completed_at: None,
            results: HashMap::new(),
            total_cost: Cost::ZERO,
            total_tokens: TokenUsage::default(),
            query_trace: None,
            errors: Vec::new(),
        }
    }

    /// Recomputes `total_cost`/`total_tokens` from `completed` results,
    /// enforcing §3 invariant 2 ("Execution total cost equals the sum of
    /// per-node costs that terminated completed") rather than trusting
    /// incremental bookkeeping to stay correct on its own.
    pub fn recompute_totals(&mut self) {
        self.total_cost = self
            .results
            .values()
            .filter(|r| r.status == NodeStatus::Completed)
            .map(|r| r.cost)
            .sum();
        self.total_tokens = self
            .results
            .values()
            .filter(|r| r.status == NodeStatus::Completed)
            .map(|r| r.tokens)
            .sum();
    }
}

// ---------------------------------------------------------------------------
// QueryTrace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTrace {
    pub steps: Vec<TraceStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub span_id: Uuid,
    pub step_type: nodes::TraceStepType,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub inputs_digest: String,
    pub outputs_digest: String,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Span (general observability)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanDescriptor {
    pub name: String,
    pub span_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// CostRecord (durable)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub node_id: String,
    pub node_type: String,
    pub cost: Cost,
    pub tokens: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_roundtrips_through_f64_without_drift_for_typical_values() {
        let c = Cost::from_f64(0.01);
        assert_eq!(c.to_f64(), 0.01);

        let total: Cost = std::iter::repeat(c).take(10).sum();
        assert_eq!(total.to_f64(), 0.10);
    }

    #[test]
    fn execution_recompute_totals_ignores_non_completed_results() {
        let mut exec = Execution::new(Uuid::new_v4(), "wf", Utc::now());
        let mut completed = NodeResult::pending("a", Utc::now());
        completed.status = NodeStatus::Completed;
        completed.cost = Cost::from_f64(1.5);
        completed.tokens = TokenUsage { input: 10, output: 5, total: 15 };

        let mut failed = NodeResult::pending("b", Utc::now());
        failed.status = NodeStatus::Failed;
        failed.cost = Cost::from_f64(99.0);

        exec.results.insert("a".into(), completed);
        exec.results.insert("b".into(), failed);
        exec.recompute_totals();

        assert_eq!(exec.total_cost.to_f64(), 1.5);
        assert_eq!(exec.total_tokens.total, 15);
    }
}

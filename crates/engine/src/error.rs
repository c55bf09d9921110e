//! Engine-level error taxonomy (§7). A closed enumeration with an
//! attached cause id — control flow never depends on message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Validation errors (§4.3, §7) — pre-execution, fatal for the whole run.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("edge references unknown node '{node_id}' ({side} side)")]
    DanglingEdge { node_id: String, side: &'static str },

    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },

    #[error("workflow graph contains a cycle: {}", .cycle.join(" -> "))]
    CyclicWorkflow { cycle: Vec<String> },
}

// ---------------------------------------------------------------------------
// Data Collector error (§4.4.3) — non-fatal to the execution, only to the
// target node.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
#[error("missing required input for node '{node_id}': {missing_fields:?}")]
pub struct MissingRequiredInput {
    pub node_id: String,
    pub missing_fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Closed error-kind enumeration shared by NodeResult.error and
// Execution.errors (§7).
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    UnknownNodeType,
    DanglingEdge,
    DuplicateNodeId,
    InvalidEdge,
    CyclicWorkflow,
    MissingRequiredInput,
    ProviderError,
    Timeout,
    Canceled,
    BadOutput,
    InternalError,
    Infrastructure,
}

impl From<&ValidationError> for ExecutionErrorKind {
    fn from(err: &ValidationError) -> Self {
        match err {
            ValidationError::UnknownNodeType { .. } => Self::UnknownNodeType,
            ValidationError::DanglingEdge { .. } => Self::DanglingEdge,
            ValidationError::DuplicateNodeId(_) => Self::DuplicateNodeId,
            ValidationError::InvalidEdge { .. } => Self::InvalidEdge,
            ValidationError::CyclicWorkflow { .. } => Self::CyclicWorkflow,
        }
    }
}

impl From<nodes::ErrorKind> for ExecutionErrorKind {
    fn from(kind: nodes::ErrorKind) -> Self {
        match kind {
            nodes::ErrorKind::ProviderError => Self::ProviderError,
            nodes::ErrorKind::Timeout => Self::Timeout,
            nodes::ErrorKind::Canceled => Self::Canceled,
            nodes::ErrorKind::BadOutput => Self::BadOutput,
            nodes::ErrorKind::InternalError => Self::InternalError,
        }
    }
}

/// Failure attached to one `NodeResult` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFailure {
    pub kind: ExecutionErrorKind,
    pub message: String,
    pub cause_id: Uuid,
}

impl NodeFailure {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), cause_id: Uuid::new_v4() }
    }
}

impl From<nodes::NodeError> for NodeFailure {
    fn from(err: nodes::NodeError) -> Self {
        Self { kind: err.kind.into(), message: err.message, cause_id: err.cause_id }
    }
}

impl From<&MissingRequiredInput> for NodeFailure {
    fn from(err: &MissingRequiredInput) -> Self {
        Self::new(ExecutionErrorKind::MissingRequiredInput, err.to_string())
    }
}

/// One entry in `Execution.errors`, in termination order (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionErrorRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub kind: ExecutionErrorKind,
    pub message: String,
    pub cause_id: Uuid,
}

impl ExecutionErrorRecord {
    pub fn from_validation(err: &ValidationError) -> Self {
        Self {
            node_id: None,
            kind: err.into(),
            message: err.to_string(),
            cause_id: Uuid::new_v4(),
        }
    }

    pub fn from_node_failure(node_id: impl Into<String>, failure: &NodeFailure) -> Self {
        Self {
            node_id: Some(node_id.into()),
            kind: failure.kind,
            message: failure.message.clone(),
            cause_id: failure.cause_id,
        }
    }
}

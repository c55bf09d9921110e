//! Node-level error type.
//!
//! The engine uses `kind` to drive propagation policy (§7): by default a
//! failed node only marks itself `failed`; a node whose registry metadata
//! sets `fatal_on_error = true` instead fails the whole execution. The
//! engine never matches on `message` text for control flow.

use thiserror::Error;
use uuid::Uuid;

/// Closed taxonomy of node execution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The node's upstream provider (LLM, vector store, tool, …) returned
    /// an error.
    ProviderError,
    /// The node did not finish within its (handler-managed) timeout.
    Timeout,
    /// The node observed cancellation and stopped.
    Canceled,
    /// The node returned output that doesn't satisfy its own output schema.
    BadOutput,
    /// Any other failure internal to the handler.
    InternalError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ProviderError => "provider_error",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::BadOutput => "bad_output",
            Self::InternalError => "internal_error",
        };
        write!(f, "{s}")
    }
}

/// Error returned by a node's `execute` method.
#[derive(Debug, Clone, Error)]
#[error("node error ({kind}): {message}")]
pub struct NodeError {
    pub kind: ErrorKind,
    pub message: String,
    /// Opaque id correlating this failure with trace/log output, never
    /// derived from or compared against `message`.
    pub cause_id: Uuid,
}

impl NodeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), cause_id: Uuid::new_v4() }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canceled, message)
    }

    pub fn bad_output(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadOutput, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}

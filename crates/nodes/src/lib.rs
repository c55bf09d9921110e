//! `nodes` crate — the `NodeHandler` trait, the node error taxonomy, and a
//! small set of illustrative retrieval-pattern handlers.
//!
//! Every node — built-in and future plugin alike — must implement
//! [`NodeHandler`]. The `engine` crate dispatches execution through this
//! trait object; it never depends on any concrete handler. Individual
//! production node implementations (LLM providers, vector stores, OCR,
//! scrapers, tool adapters, …) are out of scope for this crate — the
//! handlers in [`builtin`] exist only to exercise and test the engine.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod traits;

pub use error::{ErrorKind, NodeError};
pub use traits::{
    cancellation_pair, CancellationHandle, CancellationToken, ExecutionContext, NodeHandler,
    NodeMetadata, ProgressSink, ProgressUpdate, SecretsLookup, StaticSecrets, TraceStepType,
};

//! `engine` crate — core domain models, validation, the Data Collector,
//! the Node Executor, tracing/cost observability, the Stream Bus, and the
//! top-level Orchestrator that wires them into one `Engine::run` call.

pub mod collector;
pub mod context;
pub mod cost;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod models;
pub mod orchestrator;
pub mod redact;
pub mod registry;
pub mod stream;
pub mod tracing;
pub mod validator;

pub use collector::{CollectedInputs, DataCollector, FieldMappingTable, FieldRule, MergeStrategy};
pub use context::RunContext;
pub use cost::{CostSink, CostTracker, NoopCostSink};
pub use error::{ExecutionErrorKind, ExecutionErrorRecord, MissingRequiredInput, NodeFailure, ValidationError};
pub use executor::NodeExecutor;
pub use formatter::{Formatter, FormatterRegistry};
pub use models::{
    Cost, CostRecord, Edge, Execution, ExecutionStatus, Node, NodeResult, NodeStatus, QueryTrace,
    SpanDescriptor, SpanStatus, TokenUsage, TraceStep, Workflow,
};
pub use orchestrator::Engine;
pub use registry::{builtin_registry, NodeRegistry};
pub use stream::{Event, StreamBus};
pub use tracing::{NoopSpanSink, SpanSink, TracingSpanSink};
pub use validator::{plan, validate};

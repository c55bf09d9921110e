//! Per-run execution context (§9 Design Notes: "pass these as an
//! immutable `ExecutionContext` value constructed per `run` call. No
//! process-wide mutable engine singleton.").

use std::sync::Arc;

use nodes::{CancellationToken, SecretsLookup, StaticSecrets};

/// Caller-supplied configuration and collaborators for one `Engine::run`
/// call. Build a fresh value per run; nothing here is shared mutable
/// engine state.
#[derive(Clone)]
pub struct RunContext {
    /// Cooperative cancellation signal for this run. Construct the
    /// matching handle with [`nodes::cancellation_pair`] and keep it to
    /// call `.cancel()` from another task while `run` is in flight.
    pub cancellation: CancellationToken,
    /// Secrets made available to node handlers through their own
    /// per-node context; the engine itself never reads these values.
    pub secrets: Arc<dyn SecretsLookup>,
    /// Intelligent-routing additive namespace (§4.4 rule 5). Off by
    /// default per §9 Open Questions.
    pub intelligent_routing: bool,
    /// Bounded parallelism `P` for independent nodes (§5). `1` is always
    /// conformant (sequential-only).
    pub concurrency: usize,
}

impl RunContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            secrets: Arc::new(StaticSecrets::default()),
            intelligent_routing: false,
            concurrency: 1,
        }
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretsLookup>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_intelligent_routing(mut self, enabled: bool) -> Self {
        self.intelligent_routing = enabled;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

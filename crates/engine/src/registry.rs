//! Node Registry (§4.1) — resolves a type tag to a handler plus the
//! metadata the rest of the engine needs (validation, tracing,
//! fatal-on-error propagation) without re-invoking `execute`.

use std::collections::HashMap;
use std::sync::Arc;

use nodes::{NodeHandler, NodeMetadata};

/// Populated at process start and treated as read-only for the lifetime
/// of the process; shared (unlocked) across concurrent executions (§5).
#[derive(Clone, Default)]
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_tag: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(type_tag.into(), handler);
    }

    pub fn get(&self, type_tag: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(type_tag).cloned()
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.handlers.contains_key(type_tag)
    }

    pub fn metadata(&self, type_tag: &str) -> Option<NodeMetadata> {
        self.handlers.get(type_tag).map(|h| h.metadata())
    }
}

/// Build a registry preloaded with every illustrative handler in
/// `nodes::builtin` (§8 scenarios rely on these).
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    for (type_tag, handler) in nodes::builtin::builtin_handlers() {
        registry.register(type_tag, handler);
    }
    registry
}

//! Illustrative retrieval-pattern handlers used to exercise the engine
//! end to end (§8 scenarios). Not production node implementations —
//! those are out of scope per spec.md §1.

mod embed;
mod generate;
mod output;
mod rerank;
mod retrieve;
mod text_input;
mod tool_call;

pub use embed::EmbedNode;
pub use generate::GenerateNode;
pub use output::OutputNode;
pub use rerank::RerankNode;
pub use retrieve::RetrieveNode;
pub use text_input::TextInputNode;
pub use tool_call::ToolCallNode;

use std::sync::Arc;

use crate::traits::NodeHandler;

/// `(type_tag, handler)` pairs for every builtin handler, ready to be fed
/// into `engine::NodeRegistry::register`.
pub fn builtin_handlers() -> Vec<(&'static str, Arc<dyn NodeHandler>)> {
    vec![
        ("text_input", Arc::new(TextInputNode)),
        ("embed", Arc::new(EmbedNode)),
        ("retrieve", Arc::new(RetrieveNode)),
        ("rerank", Arc::new(RerankNode)),
        ("generate", Arc::new(GenerateNode)),
        ("tool_call", Arc::new(ToolCallNode)),
        ("output", Arc::new(OutputNode)),
    ]
}

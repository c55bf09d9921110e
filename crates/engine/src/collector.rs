//! Data Collector (§4.4) — assembles a target node's input mapping from
//! already-terminated upstream results.
//!
//! This is deliberately table-driven rather than duck-typed: each target
//! node type gets an explicit, testable list of `FieldRule`s instead of
//! ad-hoc "if this key looks like a query, use it" branching scattered
//! through the executor.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::MissingRequiredInput;
use crate::formatter::FormatterRegistry;
use crate::models::{Edge, NodeResult, NodeStatus, Workflow};

pub type CollectedInputs = Map<String, Value>;

/// How a rule's resolved value is combined with values already written to
/// the same target field by an earlier direct source (§4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Last direct writer wins; overwrites any prior value for the field.
    Scalar,
    /// Concatenate array values in edge-declaration order, recording
    /// `_provenance` alongside the merged field.
    ConcatList,
    /// Render a `results` list of `{text, ...}` chunks into a single
    /// `[n] text` newline-joined string (context-for-generation policy).
    RenderContext,
    /// Copy the candidate field through unchanged (e.g. `embeddings`,
    /// which the collector never re-derives).
    PassThrough,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub target_field: &'static str,
    pub candidate_source_fields: &'static [&'static str],
    pub strategy: MergeStrategy,
    /// If no source (direct or indirect) ever supplies this field and a
    /// direct source failed, `collect_inputs` reports it as missing.
    pub required: bool,
}

/// Target-node-type -> ordered field rules (§4.4.1).
#[derive(Clone)]
pub struct FieldMappingTable(HashMap<&'static str, Vec<FieldRule>>);

impl FieldMappingTable {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn register(&mut self, target_type: &'static str, rules: Vec<FieldRule>) {
        self.0.insert(target_type, rules);
    }

    pub fn rules_for(&self, target_type: &str) -> &[FieldRule] {
        self.0.get(target_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rules for the builtin node types in `nodes::builtin` (§4.4.1
    /// examples, specialised to the handlers this engine ships with).
    pub fn builtin() -> Self {
        let mut table = Self::new();

        table.register(
            "embed",
            vec![FieldRule {
                target_field: "query",
                candidate_source_fields: &["query", "text", "question"],
                strategy: MergeStrategy::Scalar,
                required: true,
            }],
        );

        table.register(
            "retrieve",
            vec![FieldRule {
                target_field: "embedding",
                candidate_source_fields: &["embedding", "embeddings"],
                strategy: MergeStrategy::Scalar,
                required: true,
            }],
        );

        table.register(
            "rerank",
            vec![FieldRule {
                target_field: "results",
                candidate_source_fields: &["results"],
                strategy: MergeStrategy::PassThrough,
                required: true,
            }],
        );

        table.register(
            "generate",
            vec![
                FieldRule {
                    target_field: "query",
                    candidate_source_fields: &["query", "text", "question"],
                    strategy: MergeStrategy::Scalar,
                    required: true,
                },
                FieldRule {
                    target_field: "context",
                    candidate_source_fields: &["results"],
                    strategy: MergeStrategy::RenderContext,
                    required: false,
                },
            ],
        );

        table.register(
            "tool_call",
            vec![FieldRule {
                target_field: "arguments",
                candidate_source_fields: &["arguments"],
                strategy: MergeStrategy::PassThrough,
                required: false,
            }],
        );

        table
    }
}

impl Default for FieldMappingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Assembles inputs for each node in a single execution. Holds the
/// per-execution formatter memoization cache (§4.4.2): formatting an
/// upstream output happens at most once regardless of how many
/// downstream nodes read it.
pub struct DataCollector<'a> {
    node_types: HashMap<&'a str, &'a str>,
    edges: &'a [Edge],
    table: FieldMappingTable,
    formatters: &'a FormatterRegistry,
    formatted_cache: Mutex<HashMap<String, Map<String, Value>>>,
}

impl<'a> DataCollector<'a> {
    pub fn new(workflow: &'a Workflow, formatters: &'a FormatterRegistry, table: FieldMappingTable) -> Self {
        let node_types = workflow.nodes.iter().map(|n| (n.id.as_str(), n.node_type.as_str())).collect();
        Self {
            node_types,
            edges: &workflow.edges,
            table,
            formatters,
            formatted_cache: Mutex::new(HashMap::new()),
        }
    }

    fn formatted_output(&self, node_id: &str, result: &NodeResult) -> Map<String, Value> {
        if let Some(cached) = self.formatted_cache.lock().unwrap().get(node_id) {
            return cached.clone();
        }
        let node_type = self.node_types.get(node_id).copied().unwrap_or("");
        let formatted = self.formatters.format(node_type, &result.output);
        self.formatted_cache.lock().unwrap().insert(node_id.to_string(), formatted.clone());
        formatted
    }

    /// Ancestors of `target` reached only transitively, paired with their
    /// shortest hop distance, sorted `(distance asc, id asc)` so the
    /// closest-ancestor-wins / lexicographic-tie-break rule (§4.4 rule 3)
    /// falls out of simple "first writer wins" iteration.
    fn indirect_ancestors(&self, target: &str) -> Vec<(String, usize)> {
        let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in self.edges {
            parents.entry(edge.target.as_str()).or_default().push(edge.source.as_str());
        }

        let mut distance: HashMap<&str, usize> = HashMap::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        if let Some(direct_parents) = parents.get(target) {
            for &p in direct_parents {
                queue.push_back((p, 1));
            }
        }

        while let Some((node, dist)) = queue.pop_front() {
            let entry = distance.entry(node).or_insert(usize::MAX);
            if dist >= *entry {
                continue;
            }
            *entry = dist;
            if let Some(grandparents) = parents.get(node) {
                for &gp in grandparents {
                    queue.push_back((gp, dist + 1));
                }
            }
        }

        let mut indirect: Vec<(String, usize)> = distance
            .into_iter()
            .filter(|&(_, dist)| dist >= 2)
            .map(|(id, dist)| (id.to_string(), dist))
            .collect();
        indirect.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        indirect
    }

    /// Produce the input mapping for `target_node_id` (§4.4). `results`
    /// must contain a terminal `NodeResult` for every node that can reach
    /// `target_node_id`. When `intelligent_routing` is set, every
    /// completed ancestor's formatted fields are additionally exposed
    /// under `{source_id}.{field}` (§4.4 rule 5) alongside the heuristic
    /// `{source_id}_{field}` aliases the rules above already write —
    /// strictly additive, never overwriting a heuristic-written key.
    pub fn collect_inputs(
        &self,
        target_node_id: &str,
        target_type: &str,
        results: &HashMap<String, NodeResult>,
        intelligent_routing: bool,
    ) -> Result<CollectedInputs, MissingRequiredInput> {
        let rules = self.table.rules_for(target_type);
        let mut merged: CollectedInputs = Map::new();
        let mut list_accumulators: HashMap<&'static str, (Vec<Value>, Vec<Value>)> = HashMap::new();

        let mut any_direct_edge = false;
        let mut any_direct_completed = false;
        let mut any_direct_failed = false;

        for edge in self.edges.iter().filter(|e| e.target == target_node_id) {
            any_direct_edge = true;
            let Some(source_result) = results.get(&edge.source) else { continue };

            if source_result.status != NodeStatus::Completed {
                any_direct_failed = true;
                continue;
            }
            any_direct_completed = true;

            let formatted = self.formatted_output(&edge.source, source_result);

            if let Some(target_handle) = &edge.target_handle {
                let source_field = edge.source_handle.as_deref().unwrap_or(target_handle.as_str());
                let value = formatted.get(source_field).cloned().unwrap_or(Value::Null);
                merged.insert(format!("{}_{}", edge.source, target_handle), value.clone());
                merged.insert(target_handle.clone(), value);
                continue;
            }

            for rule in rules {
                let Some((source_field, raw_value)) = rule
                    .candidate_source_fields
                    .iter()
                    .find_map(|&field| formatted.get(field).map(|v| (field, v.clone())))
                else {
                    continue;
                };

                let resolved = resolve_rule_value(rule.strategy, &raw_value);

                merged.insert(format!("{}_{}", edge.source, rule.target_field), resolved.clone());

                match rule.strategy {
                    MergeStrategy::ConcatList => {
                        let (values, provenance) = list_accumulators.entry(rule.target_field).or_default();
                        match resolved {
                            Value::Array(items) => values.extend(items),
                            other => values.push(other),
                        }
                        provenance.push(Value::Object(
                            [
                                ("source_id".to_string(), Value::String(edge.source.clone())),
                                ("field".to_string(), Value::String(source_field.to_string())),
                            ]
                            .into_iter()
                            .collect(),
                        ));
                    }
                    _ => {
                        merged.insert(rule.target_field.to_string(), resolved);
                    }
                }
            }
        }

        for (field, (values, provenance)) in list_accumulators {
            merged.insert(field.to_string(), Value::Array(values));
            merged.insert(format!("{field}_provenance"), Value::Array(provenance));
        }

        for (ancestor_id, _distance) in self.indirect_ancestors(target_node_id) {
            let Some(source_result) = results.get(&ancestor_id) else { continue };
            if source_result.status != NodeStatus::Completed {
                continue;
            }
            let formatted = self.formatted_output(&ancestor_id, source_result);

            for rule in rules {
                if merged.contains_key(rule.target_field) {
                    continue;
                }
                let Some((_, raw_value)) = rule
                    .candidate_source_fields
                    .iter()
                    .find_map(|&field| formatted.get(field).map(|v| (field, v.clone())))
                else {
                    continue;
                };
                let resolved = resolve_rule_value(rule.strategy, &raw_value);
                merged.insert(rule.target_field.to_string(), resolved);
            }
        }

        if intelligent_routing {
            let direct_sources = self.edges.iter().filter(|e| e.target == target_node_id).map(|e| e.source.as_str());
            let indirect_sources = self.indirect_ancestors(target_node_id);
            let ancestor_ids: HashSet<&str> = direct_sources.chain(indirect_sources.iter().map(|(id, _)| id.as_str())).collect();

            for ancestor_id in ancestor_ids {
                let Some(source_result) = results.get(ancestor_id) else { continue };
                if source_result.status != NodeStatus::Completed {
                    continue;
                }
                let formatted = self.formatted_output(ancestor_id, source_result);
                for (field, value) in &formatted {
                    merged.entry(format!("{ancestor_id}.{field}")).or_insert_with(|| value.clone());
                }
            }
        }

        let missing_fields: Vec<String> = rules
            .iter()
            .filter(|r| r.required && !merged.contains_key(r.target_field))
            .map(|r| r.target_field.to_string())
            .collect();

        if !missing_fields.is_empty() && any_direct_edge && any_direct_failed && !any_direct_completed {
            return Err(MissingRequiredInput { node_id: target_node_id.to_string(), missing_fields });
        }

        Ok(merged)
    }
}

fn resolve_rule_value(strategy: MergeStrategy, raw: &Value) -> Value {
    match strategy {
        MergeStrategy::RenderContext => render_context(raw),
        MergeStrategy::Scalar | MergeStrategy::ConcatList | MergeStrategy::PassThrough => raw.clone(),
    }
}

/// `results: [{text, score}]` -> `"[1] first chunk\n\n[2] second chunk"`
/// (§4.4.1 "Target expects `context` for generation", §8 scenario 1).
fn render_context(results: &Value) -> Value {
    let Some(items) = results.as_array() else { return Value::String(String::new()) };
    let rendered = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let text = item.get("text").and_then(Value::as_str).unwrap_or("");
            format!("[{}] {text}", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    Value::String(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cost, Node, NodeStatus, TokenUsage};
    use chrono::Utc;
    use serde_json::json;

    fn completed(node_id: &str, output: Value) -> NodeResult {
        NodeResult {
            node_id: node_id.to_string(),
            status: NodeStatus::Completed,
            output: output.as_object().cloned().unwrap_or_default(),
            error: None,
            cost: Cost::ZERO,
            tokens: TokenUsage::default(),
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            span_id: None,
        }
    }

    fn failed(node_id: &str) -> NodeResult {
        let mut r = completed(node_id, json!({}));
        r.status = NodeStatus::Failed;
        r
    }

    fn node(id: &str, node_type: &str) -> Node {
        Node { id: id.into(), node_type: node_type.into(), config: Value::Null }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge { source: source.into(), target: target.into(), source_handle: None, target_handle: None }
    }

    fn workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        Workflow { id: "wf".into(), nodes, edges }
    }

    #[test]
    fn direct_source_populates_mapped_field() {
        let wf = workflow(vec![node("in", "text_input"), node("emb", "embed")], vec![edge("in", "emb")]);
        let formatters = FormatterRegistry::new();
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert("in".to_string(), completed("in", json!({ "query": "hello" })));

        let inputs = collector.collect_inputs("emb", "embed", &results, false).unwrap();
        assert_eq!(inputs["query"], json!("hello"));
        assert_eq!(inputs["in_query"], json!("hello"));
    }

    #[test]
    fn direct_wins_over_indirect_for_same_field() {
        // diamond: root -> direct (writes query="direct") and root -> mid -> target (indirect, writes query="indirect")
        let wf = workflow(
            vec![node("root", "text_input"), node("direct", "text_input"), node("mid", "text_input"), node("target", "embed")],
            vec![edge("root", "mid"), edge("mid", "target"), edge("direct", "target")],
        );
        let formatters = FormatterRegistry::new();
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert("root".to_string(), completed("root", json!({ "query": "root-value" })));
        results.insert("direct".to_string(), completed("direct", json!({ "query": "direct-value" })));
        results.insert("mid".to_string(), completed("mid", json!({ "query": "indirect-value" })));

        let inputs = collector.collect_inputs("target", "embed", &results, false).unwrap();
        assert_eq!(inputs["query"], json!("direct-value"));
    }

    #[test]
    fn indirect_only_source_still_fills_field_when_no_direct_exists() {
        let wf = workflow(
            vec![node("root", "text_input"), node("mid", "text_input"), node("target", "embed")],
            vec![edge("root", "mid"), edge("mid", "target")],
        );
        let formatters = FormatterRegistry::new();
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert("root".to_string(), completed("root", json!({ "query": "root-value" })));
        results.insert("mid".to_string(), completed("mid", json!({ "query": "mid-value" })));

        let inputs = collector.collect_inputs("target", "embed", &results, false).unwrap();
        assert_eq!(inputs["query"], json!("mid-value"));
    }

    #[test]
    fn failed_direct_source_with_no_alternative_reports_missing_required_input() {
        let wf = workflow(vec![node("in", "text_input"), node("emb", "embed")], vec![edge("in", "emb")]);
        let formatters = FormatterRegistry::new();
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert("in".to_string(), failed("in"));

        let err = collector.collect_inputs("emb", "embed", &results, false).unwrap_err();
        assert_eq!(err.node_id, "emb");
        assert_eq!(err.missing_fields, vec!["query".to_string()]);
    }

    #[test]
    fn one_failed_direct_source_does_not_block_when_another_direct_source_succeeds() {
        let wf = workflow(
            vec![node("a", "text_input"), node("b", "text_input"), node("emb", "embed")],
            vec![edge("a", "emb"), edge("b", "emb")],
        );
        let formatters = FormatterRegistry::new();
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert("a".to_string(), failed("a"));
        results.insert("b".to_string(), completed("b", json!({ "query": "b-value" })));

        let inputs = collector.collect_inputs("emb", "embed", &results, false).unwrap();
        assert_eq!(inputs["query"], json!("b-value"));
    }

    #[test]
    fn list_fields_concatenate_in_edge_order_with_provenance() {
        let wf = workflow(
            vec![node("a", "retrieve"), node("b", "retrieve"), node("rr", "rerank")],
            vec![edge("a", "rr"), edge("b", "rr")],
        );
        let formatters = FormatterRegistry::new();
        let mut table = FieldMappingTable::new();
        table.register(
            "rerank",
            vec![FieldRule {
                target_field: "results",
                candidate_source_fields: &["results"],
                strategy: MergeStrategy::ConcatList,
                required: true,
            }],
        );
        let collector = DataCollector::new(&wf, &formatters, table);

        let mut results = HashMap::new();
        results.insert("a".to_string(), completed("a", json!({ "results": [{"text": "x"}] })));
        results.insert("b".to_string(), completed("b", json!({ "results": [{"text": "y"}] })));

        let inputs = collector.collect_inputs("rr", "rerank", &results, false).unwrap();
        assert_eq!(inputs["results"], json!([{"text": "x"}, {"text": "y"}]));
        assert_eq!(inputs["results_provenance"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn handle_based_edge_overrides_type_based_mapping() {
        let mut edge_with_handle = edge("in", "emb");
        edge_with_handle.source_handle = Some("alt_text".into());
        edge_with_handle.target_handle = Some("query".into());

        let wf = workflow(vec![node("in", "text_input"), node("emb", "embed")], vec![edge_with_handle]);
        let formatters = FormatterRegistry::new();
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert("in".to_string(), completed("in", json!({ "alt_text": "from-handle" })));

        let inputs = collector.collect_inputs("emb", "embed", &results, false).unwrap();
        assert_eq!(inputs["query"], json!("from-handle"));
    }

    #[test]
    fn context_is_rendered_from_results_with_indexed_prefixes() {
        let wf = workflow(vec![node("rt", "retrieve"), node("gen", "generate")], vec![edge("rt", "gen")]);
        let formatters = FormatterRegistry::new();
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert(
            "rt".to_string(),
            completed("rt", json!({ "results": [{"text": "first"}, {"text": "second"}] })),
        );

        let inputs = collector.collect_inputs("gen", "generate", &results, false).unwrap();
        assert_eq!(inputs["context"], json!("[1] first\n\n[2] second"));
    }

    #[test]
    fn formatter_is_applied_once_and_memoized_across_multiple_downstream_reads() {
        fn rename_response_to_query(raw: &Map<String, Value>) -> Map<String, Value> {
            let mut out = raw.clone();
            if let Some(v) = raw.get("response").cloned() {
                out.insert("query".into(), v);
            }
            out
        }

        let wf = workflow(
            vec![node("src", "generate"), node("e1", "embed"), node("e2", "embed")],
            vec![edge("src", "e1"), edge("src", "e2")],
        );
        let mut formatters = FormatterRegistry::new();
        formatters.register("generate", rename_response_to_query);
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert("src".to_string(), completed("src", json!({ "response": "answer" })));

        let first = collector.collect_inputs("e1", "embed", &results, false).unwrap();
        let second = collector.collect_inputs("e2", "embed", &results, false).unwrap();
        assert_eq!(first["query"], json!("answer"));
        assert_eq!(second["query"], json!("answer"));
        assert_eq!(collector.formatted_cache.lock().unwrap().len(), 1);
    }

    #[test]
    fn intelligent_routing_adds_dotted_namespace_without_disturbing_heuristic_keys() {
        let wf = workflow(
            vec![node("root", "text_input"), node("mid", "text_input"), node("target", "embed")],
            vec![edge("root", "mid"), edge("mid", "target")],
        );
        let formatters = FormatterRegistry::new();
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert("root".to_string(), completed("root", json!({ "query": "root-value", "extra": 1 })));
        results.insert("mid".to_string(), completed("mid", json!({ "query": "mid-value" })));

        let inputs = collector.collect_inputs("target", "embed", &results, true).unwrap();
        assert_eq!(inputs["query"], json!("mid-value"));
        assert_eq!(inputs["mid.query"], json!("mid-value"));
        assert_eq!(inputs["root.query"], json!("root-value"));
        assert_eq!(inputs["root.extra"], json!(1));
    }

    #[test]
    fn intelligent_routing_off_by_default_omits_dotted_namespace() {
        let wf = workflow(vec![node("in", "text_input"), node("emb", "embed")], vec![edge("in", "emb")]);
        let formatters = FormatterRegistry::new();
        let collector = DataCollector::new(&wf, &formatters, FieldMappingTable::builtin());

        let mut results = HashMap::new();
        results.insert("in".to_string(), completed("in", json!({ "query": "hello" })));

        let inputs = collector.collect_inputs("emb", "embed", &results, false).unwrap();
        assert!(!inputs.contains_key("in.query"));
    }
}

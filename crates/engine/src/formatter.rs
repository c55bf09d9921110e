//! Output Formatter Registry (§4.2) — optional per-type post-processors
//! that normalize node outputs before downstream consumption.
//!
//! A formatter must be pure and total; any panic is treated as the
//! formatter being absent and the raw output is used unchanged, per spec.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::{Map, Value};

pub type Formatter = fn(&Map<String, Value>) -> Map<String, Value>;

#[derive(Clone, Default)]
pub struct FormatterRegistry {
    formatters: HashMap<String, Formatter>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_tag: impl Into<String>, formatter: Formatter) {
        self.formatters.insert(type_tag.into(), formatter);
    }

    /// Apply the formatter registered for `type_tag`, if any. A panicking
    /// formatter is caught and treated as absent (§4.2).
    pub fn format(&self, type_tag: &str, raw_output: &Map<String, Value>) -> Map<String, Value> {
        match self.formatters.get(type_tag) {
            Some(formatter) => {
                let formatter = *formatter;
                let raw = raw_output.clone();
                match catch_unwind(AssertUnwindSafe(|| formatter(&raw))) {
                    Ok(formatted) => formatted,
                    Err(_) => raw_output.clone(),
                }
            }
            None => raw_output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unify_response_text(raw: &Map<String, Value>) -> Map<String, Value> {
        let mut out = raw.clone();
        if let Some(text) = raw.get("response").cloned() {
            out.insert("text".into(), text);
        }
        out
    }

    fn panics(_raw: &Map<String, Value>) -> Map<String, Value> {
        panic!("boom");
    }

    #[test]
    fn registered_formatter_transforms_output() {
        let mut registry = FormatterRegistry::new();
        registry.register("generate", unify_response_text);

        let raw = json!({ "response": "hi" }).as_object().unwrap().clone();
        let formatted = registry.format("generate", &raw);
        assert_eq!(formatted["text"], json!("hi"));
    }

    #[test]
    fn missing_formatter_returns_raw_output_unchanged() {
        let registry = FormatterRegistry::new();
        let raw = json!({ "a": 1 }).as_object().unwrap().clone();
        assert_eq!(registry.format("unregistered", &raw), raw);
    }

    #[test]
    fn panicking_formatter_is_treated_as_absent() {
        let mut registry = FormatterRegistry::new();
        registry.register("broken", panics);

        let raw = json!({ "a": 1 }).as_object().unwrap().clone();
        assert_eq!(registry.format("broken", &raw), raw);
    }
}

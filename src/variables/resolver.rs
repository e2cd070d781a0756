//! `{{key}}` template substitution over the merged variable scopes.
//!
//! Substitution is a single left-to-right pass. A substituted value is
//! never scanned again, so a variable whose value contains `{{other}}`
//! comes out with that text intact.

use std::collections::BTreeMap;

use serde_json::Value;

use super::store::VariableStore;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Resolves `{{identifier}}` tokens against a precedence-merged lookup.
pub struct Resolver {
    lookup: BTreeMap<String, Value>,
}

impl Resolver {
    /// Snapshot the store's merged view.
    pub fn new(store: &VariableStore) -> Self {
        Self {
            lookup: store.merged(),
        }
    }

    /// Resolver over an explicit lookup map.
    pub fn from_map(lookup: BTreeMap<String, Value>) -> Self {
        Self { lookup }
    }

    /// Replace every `{{identifier}}` token.
    ///
    /// Unknown identifiers become the bare identifier name. Objects and
    /// arrays are embedded as compact JSON; scalars as their display form.
    pub fn resolve(&self, input: &str) -> String {
        let mut output = String::with_capacity(input.len());
        let mut pos = 0;

        while let Some(offset) = input[pos..].find(OPEN) {
            let start = pos + offset;
            output.push_str(&input[pos..start]);

            let inner_start = start + OPEN.len();
            let Some(close) = input[inner_start..].find(CLOSE) else {
                // Unterminated: the rest is plain text.
                output.push_str(&input[start..]);
                return output;
            };
            let inner_end = inner_start + close;
            let name = input[inner_start..inner_end].trim();

            if is_identifier(name) {
                output.push_str(&self.substitute(name));
                pos = inner_end + CLOSE.len();
            } else {
                // Not a token; emit one brace and rescan from the next one.
                output.push('{');
                pos = start + 1;
            }
        }

        output.push_str(&input[pos..]);
        output
    }

    /// Resolve tokens, then pretty-print the result if it parses as JSON.
    ///
    /// Falls back to the token-resolved text when it is not valid JSON.
    pub fn resolve_json(&self, input: &str) -> String {
        let resolved = self.resolve(input);
        match serde_json::from_str::<Value>(&resolved) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or(resolved),
            Err(_) => resolved,
        }
    }

    fn substitute(&self, name: &str) -> String {
        match self.lookup.get(name) {
            Some(value) => value_to_text(value),
            None => name.to_string(),
        }
    }
}

/// Resolve `input` against `store` in one call.
pub fn resolve(store: &VariableStore, input: &str) -> String {
    Resolver::new(store).resolve(input)
}

/// JSON-aware variant of [`resolve`].
pub fn resolve_json(store: &VariableStore, input: &str) -> String {
    Resolver::new(store).resolve_json(input)
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '$'))
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

//! Three-scope variable store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A variable scope. Scopes are independent namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Environment,
    Local,
}

impl Scope {
    /// All scopes in resolution order, lowest precedence first.
    pub const ALL: [Scope; 3] = [Scope::Global, Scope::Environment, Scope::Local];
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Environment => f.write_str("environment"),
            Scope::Local => f.write_str("local"),
        }
    }
}

/// Key/value map for one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedVariables {
    values: BTreeMap<String, Value>,
}

impl ScopedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Insert or replace a value, returning the previous one.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Shallow snapshot of every entry. Later writes do not show up in it.
    pub fn all(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every entry at once.
    pub fn replace(&mut self, values: BTreeMap<String, Value>) {
        self.values = values;
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// The global, environment and local scopes of one runtime.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    global: ScopedVariables,
    environment: ScopedVariables,
    local: ScopedVariables,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self, scope: Scope) -> &ScopedVariables {
        match scope {
            Scope::Global => &self.global,
            Scope::Environment => &self.environment,
            Scope::Local => &self.local,
        }
    }

    pub fn scope_mut(&mut self, scope: Scope) -> &mut ScopedVariables {
        match scope {
            Scope::Global => &mut self.global,
            Scope::Environment => &mut self.environment,
            Scope::Local => &mut self.local,
        }
    }

    /// Load a whole environment, dropping whatever was there.
    pub fn load_environment(&mut self, values: BTreeMap<String, Value>) {
        self.environment.replace(values);
    }

    /// Precedence-merged view: local overrides environment overrides global.
    pub fn merged(&self) -> BTreeMap<String, Value> {
        let mut merged = BTreeMap::new();
        for scope in Scope::ALL {
            for (key, value) in self.scope(scope).iter() {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

//! Script types and data structures.

use serde::{Deserialize, Serialize};

/// A user script owned by the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Unique identifier (relative path without extension when loaded from disk).
    pub id: String,
    /// Lua source.
    pub code: String,
    /// Whether the script is loaded into the engine.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Script {
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Outcome of one `chrollo.test.test` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// Result of scanning a scripts directory.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Scripts found, in path order.
    pub scripts: Vec<Script>,
    /// Files that could not be read: (path, error).
    pub errors: Vec<(String, String)>,
}

impl ScanResult {
    /// Enabled scripts only, in path order.
    pub fn enabled(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter().filter(|s| s.enabled)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

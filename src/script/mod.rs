//! Sandboxed Lua scripting.
//!
//! User scripts run inside a [`Sandbox`] and see only the frozen `chrollo`
//! API and a `console` shim. The [`ScriptEngine`] owns the sandbox, the
//! runtime state the API mutates, and the hook dispatch the transport
//! layer drives.

pub mod api;
pub mod engine;
pub mod faker;
pub mod loader;
mod pattern;
pub mod runtime;
pub mod sandbox;
pub mod types;

pub use api::{random_id, ApiOptions, ApiSurface};
pub use engine::{EngineState, ScriptEngine, SendOutcome};
pub use faker::{DataGenerator, RandomDataGenerator, FAKER_METHODS};
pub use loader::{ScriptLoader, ScriptMetadata};
pub use runtime::RuntimeState;
pub use sandbox::{ResourceLimits, Sandbox};
pub use types::{ScanResult, Script, TestResult};

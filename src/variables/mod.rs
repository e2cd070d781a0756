//! Variable scopes and `{{key}}` resolution.

pub mod resolver;
pub mod store;

pub use resolver::{resolve, resolve_json, Resolver};
pub use store::{Scope, ScopedVariables, VariableStore};

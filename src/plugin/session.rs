//! Per-connection plugin session state.

use std::collections::HashMap;

/// Sessions keyed by connection id, created on first access.
#[derive(Debug)]
pub struct SessionStore<T> {
    sessions: HashMap<String, T>,
}

impl<T> SessionStore<T> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// The session for `connection_id`, created with `init` if missing.
    pub fn get_or_create(&mut self, connection_id: &str, init: impl FnOnce() -> T) -> &mut T {
        self.sessions
            .entry(connection_id.to_string())
            .or_insert_with(init)
    }

    pub fn get(&self, connection_id: &str) -> Option<&T> {
        self.sessions.get(connection_id)
    }

    pub fn remove(&mut self, connection_id: &str) -> Option<T> {
        self.sessions.remove(connection_id)
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<T> Default for SessionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Runtime state shared by the script API surface and the engine.
//!
//! One [`RuntimeState`] exists per engine generation. It is never cleared
//! in place: a reset builds a new one and drops the old one whole.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use super::faker::{DataGenerator, RandomDataGenerator};
use super::types::TestResult;
use crate::correlation::CorrelationTracker;
use crate::hooks::HookRegistries;
use crate::notify::Notifier;
use crate::variables::VariableStore;

/// Variables, correlation, hooks and test results of one engine generation.
pub struct RuntimeState {
    variables: RefCell<VariableStore>,
    tracker: RefCell<CorrelationTracker>,
    hooks: RefCell<HookRegistries>,
    test_results: RefCell<Vec<TestResult>>,
    generator: Rc<dyn DataGenerator>,
    notifier: Notifier,
}

impl RuntimeState {
    pub fn new(notifier: Notifier) -> Self {
        Self::with_generator(notifier, Rc::new(RandomDataGenerator))
    }

    pub fn with_generator(notifier: Notifier, generator: Rc<dyn DataGenerator>) -> Self {
        Self {
            variables: RefCell::new(VariableStore::new()),
            tracker: RefCell::new(CorrelationTracker::new(notifier.clone())),
            hooks: RefCell::new(HookRegistries::new()),
            test_results: RefCell::new(Vec::new()),
            generator,
            notifier,
        }
    }

    pub fn variables(&self) -> Ref<'_, VariableStore> {
        self.variables.borrow()
    }

    pub fn variables_mut(&self) -> RefMut<'_, VariableStore> {
        self.variables.borrow_mut()
    }

    pub fn tracker(&self) -> Ref<'_, CorrelationTracker> {
        self.tracker.borrow()
    }

    pub fn tracker_mut(&self) -> RefMut<'_, CorrelationTracker> {
        self.tracker.borrow_mut()
    }

    pub fn hooks(&self) -> Ref<'_, HookRegistries> {
        self.hooks.borrow()
    }

    pub fn hooks_mut(&self) -> RefMut<'_, HookRegistries> {
        self.hooks.borrow_mut()
    }

    pub fn record_test(&self, result: TestResult) {
        self.test_results.borrow_mut().push(result);
    }

    pub fn test_results(&self) -> Vec<TestResult> {
        self.test_results.borrow().clone()
    }

    pub fn clear_test_results(&self) {
        self.test_results.borrow_mut().clear();
    }

    pub fn generator(&self) -> Rc<dyn DataGenerator> {
        Rc::clone(&self.generator)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::Scope;
    use serde_json::json;

    #[test]
    fn test_fresh_state_is_empty() {
        let state = RuntimeState::new(Notifier::discard());
        assert!(state.hooks().is_empty());
        assert!(state.tracker().is_empty());
        assert!(state.variables().merged().is_empty());
        assert!(state.test_results().is_empty());
    }

    #[test]
    fn test_states_do_not_share_data() {
        let a = RuntimeState::new(Notifier::discard());
        let b = RuntimeState::new(Notifier::discard());

        a.variables_mut().scope_mut(Scope::Global).set("k", json!(1));

        assert!(b.variables().scope(Scope::Global).get("k").is_none());
    }

    #[test]
    fn test_record_and_clear_tests() {
        let state = RuntimeState::new(Notifier::discard());
        state.record_test(TestResult {
            name: "t".to_string(),
            passed: false,
            error: Some("nope".to_string()),
            timestamp: 0,
        });
        assert_eq!(state.test_results().len(), 1);

        state.clear_test_results();
        assert!(state.test_results().is_empty());
    }
}

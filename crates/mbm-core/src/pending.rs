//! Registry of in-flight device constructions
//!
//! One entry per device name while its initialization pipeline runs.
//! Cancellation is cooperative: the token is a flag the pipeline checks at
//! step boundaries; an operation already submitted runs to completion and
//! its result is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag for one pending construction
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-flight construction registry, keyed by device name
///
/// All mutation happens on the manager task; the registry only defends
/// against double-remove, which must stay idempotent.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: HashMap<String, CancelToken>,
}

impl PendingRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a construction; at most one entry per name
    pub fn add(&mut self, name: String, token: CancelToken) {
        let previous = self.entries.insert(name, token);
        debug_assert!(previous.is_none(), "duplicate pending entry");
    }

    /// Whether a construction for `name` is in flight
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether the entry for `name` has been cancelled
    pub fn is_cancelled(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(CancelToken::is_cancelled)
    }

    /// Drop the entry for `name`
    ///
    /// Returns true exactly when this call made the registry empty, the
    /// signal the manager uses to turn detection activity off. A second
    /// remove for the same name is a no-op returning false.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some() && self.entries.is_empty()
    }

    /// Cancel the entry for `name`, if present
    pub fn cancel(&self, name: &str) {
        if let Some(token) = self.entries.get(name) {
            token.cancel();
        }
    }

    /// Cancel every entry
    pub fn cancel_all(&self) {
        for token in self.entries.values() {
            token.cancel();
        }
    }

    /// Number of in-flight constructions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no construction is in flight
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn remove_reports_transition_to_empty() {
        let mut reg = PendingRegistry::new();
        reg.add("cdc-wdm0".into(), CancelToken::new());
        reg.add("cdc-wdm1".into(), CancelToken::new());

        assert!(!reg.remove("cdc-wdm0"));
        assert!(reg.remove("cdc-wdm1"));
    }

    #[test]
    fn double_remove_is_idempotent() {
        let mut reg = PendingRegistry::new();
        reg.add("cdc-wdm0".into(), CancelToken::new());

        assert!(reg.remove("cdc-wdm0"));
        assert!(!reg.remove("cdc-wdm0"));
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_of_absent_name_does_not_report_empty() {
        let mut reg = PendingRegistry::new();
        reg.add("cdc-wdm0".into(), CancelToken::new());
        assert!(!reg.remove("cdc-wdm7"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn cancel_flips_the_token() {
        let mut reg = PendingRegistry::new();
        let token = CancelToken::new();
        reg.add("cdc-wdm0".into(), token.clone());

        reg.cancel("cdc-wdm0");
        assert!(token.is_cancelled());
        assert!(reg.is_cancelled("cdc-wdm0"));
    }

    #[test]
    fn cancel_of_absent_name_is_a_noop() {
        let reg = PendingRegistry::new();
        reg.cancel("cdc-wdm0");
        assert!(reg.is_empty());
    }

    #[test]
    fn cancel_all_flips_every_token() {
        let mut reg = PendingRegistry::new();
        let a = CancelToken::new();
        let b = CancelToken::new();
        reg.add("cdc-wdm0".into(), a.clone());
        reg.add("cdc-wdm1".into(), b.clone());

        reg.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    proptest! {
        /// Removing every added name in any order reports the empty
        /// transition exactly once.
        #[test]
        fn empty_transition_fires_once(mut names in proptest::collection::hash_set("[a-z0-9]{1,8}", 1..8)) {
            let names: Vec<String> = names.drain().collect();
            let mut reg = PendingRegistry::new();
            for n in &names {
                reg.add(n.clone(), CancelToken::new());
            }
            let transitions = names
                .iter()
                .filter(|n| reg.remove(n))
                .count();
            prop_assert_eq!(transitions, 1);
            prop_assert!(reg.is_empty());
        }
    }
}

//! Cooperative cancellation and the in-memory active-check registry.
//!
//! The registry is the only engine state that lives outside the store. Its
//! sole purpose is letting an operator cancel one long-running probe from
//! another thread; on process start the store-side `reset_all_checking`
//! sweep restores consistency for whatever the registry forgot in a crash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::HealthPulseError;

/// Cooperative interrupt flag with optional parent scoping.
///
/// Firing is idempotent. A child token observes its parent, so interrupting
/// an outer scope interrupts every probe derived from it, while firing a
/// child leaves siblings untouched.
#[derive(Clone, Debug, Default)]
pub struct InterruptToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<InterruptToken>>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child scope. The child fires when either it or any ancestor
    /// is interrupted.
    pub fn child(&self) -> Self {
        InterruptToken {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        if self.flag.load(Ordering::Acquire) {
            return true;
        }
        self.parent
            .as_ref()
            .is_some_and(|parent| parent.is_interrupted())
    }
}

/// Registry of in-flight checks, keyed by file path.
///
/// Holders must not keep the internal lock across blocking I/O; every method
/// here does a short map operation and returns.
#[derive(Default)]
pub struct ActiveChecks {
    checks: Mutex<HashMap<String, InterruptToken>>,
}

impl ActiveChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new in-flight check. Fails if the path already has one; a
    /// second concurrent run of the same file is never allowed.
    pub fn register(
        &self,
        file_path: &str,
        token: InterruptToken,
    ) -> Result<(), HealthPulseError> {
        let mut checks = self.checks.lock().unwrap();
        if checks.contains_key(file_path) {
            return Err(HealthPulseError::AlreadyActive(file_path.to_string()));
        }
        checks.insert(file_path.to_string(), token);
        Ok(())
    }

    /// Drop the entry for a finished check. Safe to call when the entry was
    /// already removed by a cancel.
    pub fn deregister(&self, file_path: &str) {
        self.checks.lock().unwrap().remove(file_path);
    }

    /// Fire the token for an in-flight check and remove the entry.
    pub fn cancel(&self, file_path: &str) -> Result<(), HealthPulseError> {
        let token = {
            let mut checks = self.checks.lock().unwrap();
            checks
                .remove(file_path)
                .ok_or_else(|| HealthPulseError::NoActiveCheck(file_path.to_string()))?
        };
        token.interrupt();
        Ok(())
    }

    pub fn is_active(&self, file_path: &str) -> bool {
        self.checks.lock().unwrap().contains_key(file_path)
    }

    pub fn active_count(&self) -> usize {
        self.checks.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_fires_idempotently() {
        let token = InterruptToken::new();
        assert!(!token.is_interrupted());
        token.interrupt();
        token.interrupt();
        assert!(token.is_interrupted());
    }

    #[test]
    fn test_child_observes_parent() {
        let parent = InterruptToken::new();
        let child = parent.child();
        assert!(!child.is_interrupted());
        parent.interrupt();
        assert!(child.is_interrupted());
        assert!(parent.is_interrupted());
    }

    #[test]
    fn test_child_does_not_fire_parent() {
        let parent = InterruptToken::new();
        let child = parent.child();
        child.interrupt();
        assert!(child.is_interrupted());
        assert!(!parent.is_interrupted());
    }

    #[test]
    fn test_grandchild_observes_root() {
        let root = InterruptToken::new();
        let grandchild = root.child().child();
        root.interrupt();
        assert!(grandchild.is_interrupted());
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let registry = ActiveChecks::new();
        registry.register("/m/a.mkv", InterruptToken::new()).unwrap();
        let err = registry
            .register("/m/a.mkv", InterruptToken::new())
            .unwrap_err();
        assert!(matches!(err, HealthPulseError::AlreadyActive(_)));
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_cancel_fires_registered_token() {
        let registry = ActiveChecks::new();
        let token = InterruptToken::new();
        registry.register("/m/a.mkv", token.clone()).unwrap();

        registry.cancel("/m/a.mkv").unwrap();
        assert!(token.is_interrupted());
        assert!(!registry.is_active("/m/a.mkv"));
    }

    #[test]
    fn test_cancel_without_entry() {
        let registry = ActiveChecks::new();
        let err = registry.cancel("/m/missing.mkv").unwrap_err();
        assert!(matches!(err, HealthPulseError::NoActiveCheck(_)));
    }

    #[test]
    fn test_deregister_is_tolerant() {
        let registry = ActiveChecks::new();
        registry.register("/m/a.mkv", InterruptToken::new()).unwrap();
        registry.cancel("/m/a.mkv").unwrap();
        // Entry already gone; the finishing check still deregisters
        registry.deregister("/m/a.mkv");
        assert_eq!(registry.active_count(), 0);
    }
}

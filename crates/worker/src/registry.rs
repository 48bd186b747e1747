//! Claimed worker ids.

use std::collections::HashSet;
use std::sync::Mutex;

/// Worker ids this server has seen claim one of its PCs. Membership only.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Mutex<HashSet<String>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the id was not registered yet.
    pub fn register(&self, worker_id: &str) -> bool {
        match self.workers.lock() {
            Ok(mut w) => w.insert(worker_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(worker_id.to_string()),
        }
    }

    /// Returns `true` when the id was registered.
    pub fn unregister(&self, worker_id: &str) -> bool {
        match self.workers.lock() {
            Ok(mut w) => w.remove(worker_id),
            Err(poisoned) => poisoned.into_inner().remove(worker_id),
        }
    }

    pub fn contains(&self, worker_id: &str) -> bool {
        match self.workers.lock() {
            Ok(w) => w.contains(worker_id),
            Err(poisoned) => poisoned.into_inner().contains(worker_id),
        }
    }

    pub fn len(&self) -> usize {
        match self.workers.lock() {
            Ok(w) => w.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let registry = WorkerRegistry::new();
        assert!(registry.register("w1"));
        assert!(!registry.register("w1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = WorkerRegistry::new();
        registry.register("w1");
        assert!(registry.unregister("w1"));
        assert!(!registry.unregister("w1"));
        assert!(!registry.contains("w1"));
        assert!(registry.is_empty());
    }
}

//! Shared execution state.
//!
//! One [`ExecutionContext`] is built per run and shared by every node task:
//! the gating-predicate index, the failed-id set, the execution error log,
//! the cooperative shutdown flag, and the observed level hierarchy.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::error::PhlexError;
use crate::graph::nodes::predicate::DeclaredPredicate;
use crate::model::{LevelHierarchy, LevelId, ProductStore};

/// Per-run shared state handed to every node invocation.
pub struct ExecutionContext {
    gates: HashMap<String, Arc<DeclaredPredicate>>,
    failed: Mutex<HashSet<u64>>,
    failed_ids: Mutex<Vec<String>>,
    error_log: Mutex<Vec<String>>,
    shutdown: AtomicBool,
    hierarchy: LevelHierarchy,
    stores_processed: AtomicU64,
}

impl ExecutionContext {
    /// Build the context from the gate index assembled at composition.
    pub fn new(gates: HashMap<String, Arc<DeclaredPredicate>>) -> Self {
        Self {
            gates,
            failed: Mutex::new(HashSet::new()),
            failed_ids: Mutex::new(Vec::new()),
            error_log: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
            hierarchy: LevelHierarchy::new(),
            stores_processed: AtomicU64::new(0),
        }
    }

    /// Look up a gating predicate by alias.
    pub fn gate(&self, name: &str) -> Option<&Arc<DeclaredPredicate>> {
        self.gates.get(name)
    }

    /// Record a node failure for the store's id.
    ///
    /// Downstream consumption for the id (and its descendants) is skipped;
    /// the flush protocol still completes.
    pub fn mark_failed(&self, store: &ProductStore, node: &str, error: &PhlexError) {
        let id = store.id();
        let newly_failed = self.failed.lock().insert(id.hash());
        if newly_failed {
            self.failed_ids.lock().push(id.to_string());
        }
        let message = format!("node '{node}' failed for {id}: {error}");
        tracing::warn!(node = %node, id = %id, error = %error, "node invocation failed");
        self.error_log.lock().push(message);
    }

    /// Whether the id, or any of its ancestors, has been marked failed.
    pub fn is_failed(&self, id: &LevelId) -> bool {
        let failed = self.failed.lock();
        if failed.is_empty() {
            return false;
        }
        id.hash_chain().iter().any(|h| failed.contains(h))
    }

    /// Append a message to the execution error log.
    pub fn record_error(&self, message: String) {
        tracing::error!("{message}");
        self.error_log.lock().push(message);
    }

    /// Snapshot of the execution error log.
    pub fn errors(&self) -> Vec<String> {
        self.error_log.lock().clone()
    }

    /// Rendered ids marked failed, in failure order.
    pub fn failed_ids(&self) -> Vec<String> {
        self.failed_ids.lock().clone()
    }

    /// Request cooperative shutdown; in-flight invocations run to
    /// completion.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// The observed level hierarchy.
    pub fn hierarchy(&self) -> &LevelHierarchy {
        &self.hierarchy
    }

    /// Count one dispatched process store.
    pub fn count_store(&self) {
        self.stores_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Process stores dispatched so far.
    pub fn stores_processed(&self) -> u64 {
        self.stores_processed.load(Ordering::Relaxed)
    }
}

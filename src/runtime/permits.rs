//! Per-node concurrency limits.
//!
//! Every node runs under a permit pool: `Serial` is a single permit,
//! `Limit(n)` an n-permit semaphore, and `Unlimited` skips acquisition
//! entirely.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Concurrency limit of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Concurrency {
    /// One invocation at a time.
    Serial,
    /// No limit.
    Unlimited,
    /// At most `n` invocations at a time.
    Limit(usize),
}

impl Concurrency {
    /// The permit count, if the limit is bounded.
    pub fn permits(&self) -> Option<usize> {
        match self {
            Concurrency::Serial => Some(1),
            Concurrency::Unlimited => None,
            Concurrency::Limit(n) => Some((*n).max(1)),
        }
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency::Serial
    }
}

/// Permit pool enforcing a node's concurrency limit.
#[derive(Debug, Clone)]
pub struct PermitPool {
    semaphore: Option<Arc<Semaphore>>,
}

impl PermitPool {
    /// Build the pool for a limit.
    pub fn new(limit: Concurrency) -> Self {
        Self {
            semaphore: limit.permits().map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Acquire a permit; `None` when the pool is unlimited.
    ///
    /// The permit releases on drop.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.semaphore {
            Some(semaphore) => {
                // The semaphore is never closed while the pool exists.
                let permit = Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .expect("permit semaphore closed");
                Some(permit)
            },
            None => None,
        }
    }

    /// Permits currently available; `None` when unlimited.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }
}

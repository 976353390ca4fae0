//! The persistence contract consumed by output nodes.
//!
//! The core never interprets payloads: products cross this boundary as
//! erased values tagged with type-name strings agreed between producer and
//! backend. Writes are staged per `(creator, product)` and become readable
//! once committed under an id. [`InMemoryBackend`] implements the contract
//! for tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::{LevelId, ProductValue};

/// Errors raised by persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Writing into a container that was never created.
    #[error("no container for creator '{0}'")]
    MissingContainer(String),

    /// Writing a product the container was not created for.
    #[error("container '{creator}' has no slot for product '{product}'")]
    UnknownProduct {
        /// Output creator name
        creator: String,
        /// Product name
        product: String,
    },

    /// The staged type name disagrees with the container declaration.
    #[error("product '{product}' declared as '{declared}', written as '{written}'")]
    TypeMismatch {
        /// Product name
        product: String,
        /// Declared type name
        declared: String,
        /// Written type name
        written: String,
    },

    /// Reading a product that was never committed for the id.
    #[error("nothing committed for '{creator}/{product}' at {id}")]
    NotCommitted {
        /// Output creator name
        creator: String,
        /// Product name
        product: String,
        /// Rendered level id
        id: String,
    },

    /// Backend-specific failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Write/read contract between output nodes and a storage backend.
pub trait PersistenceBackend: Send + Sync {
    /// Declare the containers a creator will write: `(product, type_name)`
    /// pairs.
    fn create_containers(
        &self,
        creator: &str,
        products: &[(String, String)],
    ) -> Result<(), PersistenceError>;

    /// Stage one product value for the creator.
    fn register_write(
        &self,
        creator: &str,
        product: &str,
        data: &ProductValue,
        type_name: &str,
    ) -> Result<(), PersistenceError>;

    /// Commit everything staged for the creator under the id.
    fn commit_output(&self, creator: &str, id: &LevelId) -> Result<(), PersistenceError>;

    /// Read a committed product back.
    fn read(
        &self,
        creator: &str,
        product: &str,
        id: &LevelId,
    ) -> Result<ProductValue, PersistenceError>;
}

type ContainerMap = HashMap<String, HashMap<String, String>>;
type StagedMap = HashMap<(String, String), ProductValue>;
type CommittedMap = HashMap<(String, String, u64), ProductValue>;

/// Map-backed persistence for tests and demos.
#[derive(Default)]
pub struct InMemoryBackend {
    containers: Mutex<ContainerMap>,
    staged: Mutex<StagedMap>,
    committed: Mutex<CommittedMap>,
}

impl InMemoryBackend {
    /// An empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// A shared handle, convenient for capture in output closures.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of committed entries.
    pub fn committed_len(&self) -> usize {
        self.committed.lock().len()
    }
}

impl PersistenceBackend for InMemoryBackend {
    fn create_containers(
        &self,
        creator: &str,
        products: &[(String, String)],
    ) -> Result<(), PersistenceError> {
        let mut containers = self.containers.lock();
        let slots = containers.entry(creator.to_string()).or_default();
        for (product, type_name) in products {
            slots.insert(product.clone(), type_name.clone());
        }
        Ok(())
    }

    fn register_write(
        &self,
        creator: &str,
        product: &str,
        data: &ProductValue,
        type_name: &str,
    ) -> Result<(), PersistenceError> {
        {
            let containers = self.containers.lock();
            let slots = containers
                .get(creator)
                .ok_or_else(|| PersistenceError::MissingContainer(creator.to_string()))?;
            let declared = slots.get(product).ok_or_else(|| {
                PersistenceError::UnknownProduct {
                    creator: creator.to_string(),
                    product: product.to_string(),
                }
            })?;
            if declared != type_name {
                return Err(PersistenceError::TypeMismatch {
                    product: product.to_string(),
                    declared: declared.clone(),
                    written: type_name.to_string(),
                });
            }
        }
        self.staged
            .lock()
            .insert((creator.to_string(), product.to_string()), data.clone());
        Ok(())
    }

    fn commit_output(&self, creator: &str, id: &LevelId) -> Result<(), PersistenceError> {
        let mut staged = self.staged.lock();
        let keys: Vec<_> = staged
            .keys()
            .filter(|(c, _)| c == creator)
            .cloned()
            .collect();
        let mut committed = self.committed.lock();
        for key in keys {
            if let Some(value) = staged.remove(&key) {
                committed.insert((key.0, key.1, id.hash()), value);
            }
        }
        Ok(())
    }

    fn read(
        &self,
        creator: &str,
        product: &str,
        id: &LevelId,
    ) -> Result<ProductValue, PersistenceError> {
        self.committed
            .lock()
            .get(&(creator.to_string(), product.to_string(), id.hash()))
            .cloned()
            .ok_or_else(|| PersistenceError::NotCommitted {
                creator: creator.to_string(),
                product: product.to_string(),
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_commit_read_round_trip() {
        let backend = InMemoryBackend::new();
        backend
            .create_containers("writer", &[("y".to_string(), "i32".to_string())])
            .unwrap();

        let id = LevelId::base().make_child(0, "event");
        backend
            .register_write("writer", "y", &ProductValue::new(6i32), "i32")
            .unwrap();
        backend.commit_output("writer", &id).unwrap();

        let value = backend.read("writer", "y", &id).unwrap();
        assert_eq!(*value.get::<i32>().unwrap(), 6);
        assert_eq!(backend.committed_len(), 1);
    }

    #[test]
    fn test_uncreated_container_is_rejected() {
        let backend = InMemoryBackend::new();
        let err = backend
            .register_write("writer", "y", &ProductValue::new(1i32), "i32")
            .unwrap_err();
        assert!(matches!(err, PersistenceError::MissingContainer(_)));
    }

    #[test]
    fn test_type_name_must_agree() {
        let backend = InMemoryBackend::new();
        backend
            .create_containers("writer", &[("y".to_string(), "i32".to_string())])
            .unwrap();
        let err = backend
            .register_write("writer", "y", &ProductValue::new(1.0f64), "f64")
            .unwrap_err();
        assert!(matches!(err, PersistenceError::TypeMismatch { .. }));
    }

    #[test]
    fn test_read_before_commit_fails() {
        let backend = InMemoryBackend::new();
        backend
            .create_containers("writer", &[("y".to_string(), "i32".to_string())])
            .unwrap();
        backend
            .register_write("writer", "y", &ProductValue::new(1i32), "i32")
            .unwrap();
        let id = LevelId::base();
        let err = backend.read("writer", "y", &id).unwrap_err();
        assert!(matches!(err, PersistenceError::NotCommitted { .. }));
    }
}

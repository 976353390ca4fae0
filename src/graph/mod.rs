//! Graph composition: catalog, registrar, typed proxy, node kinds, and
//! composition-time validation.
//!
//! Registration flows through a [`GraphProxy`] into the [`PipelineGraph`]'s
//! catalog; [`flow::compose`] then validates the whole batch and produces
//! the executable graph.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Configuration;

pub mod algorithm;
pub mod catalog;
pub mod flow;
pub mod nodes;
pub mod proxy;
pub mod registrar;

pub use algorithm::{
    BoundObserverFn, BoundPredicateFn, BoundTransformFn, FoldFn, IntoProducts,
    IntoPredicateResult, IntoUnitResult, ObserverFn, PredicateFn, ResolvedInputs, TransformFn,
    UnfoldFn,
};
pub use catalog::NodeCatalog;
pub use flow::{compose, ComposedGraph};
pub use nodes::{FlowNode, NodeKind};
pub use proxy::{BoundProxy, GraphProxy};

pub use crate::runtime::permits::Concurrency;

/// A pipeline under construction: configuration plus the shared catalog.
pub struct PipelineGraph {
    config: Arc<Configuration>,
    catalog: Arc<Mutex<NodeCatalog>>,
}

impl PipelineGraph {
    /// Start an empty pipeline with the given configuration.
    pub fn new(config: Configuration) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(Mutex::new(NodeCatalog::new())),
        }
    }

    /// The configuration the pipeline was built with.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// A registration facade over this pipeline's catalog.
    pub fn proxy(&self) -> GraphProxy {
        GraphProxy::new(Arc::clone(&self.config), Arc::clone(&self.catalog))
    }

    /// Snapshot of the accumulated registration errors.
    pub fn errors(&self) -> Vec<String> {
        self.catalog.lock().errors().to_vec()
    }

    pub(crate) fn catalog(&self) -> Arc<Mutex<NodeCatalog>> {
        Arc::clone(&self.catalog)
    }
}

//! Declared algorithm nodes.
//!
//! Each registered algorithm becomes one of six node kinds wrapping the
//! user function as a stateful executor: it resolves its input labels
//! against arriving stores, honors gating and its concurrency permit, runs
//! exactly once per matching id, and publishes whatever its kind calls for.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::graph::algorithm::ResolvedInputs;
use crate::model::{
    most_derived_of, AlgorithmName, LevelId, ProductStore, SpecifiedLabel,
};
use crate::runtime::context::ExecutionContext;
use crate::runtime::permits::Concurrency;

pub mod fold;
pub mod observer;
pub mod output;
pub mod predicate;
pub mod transform;
pub mod unfold;

pub use fold::DeclaredFold;
pub use observer::DeclaredObserver;
pub use output::DeclaredOutput;
pub use predicate::DeclaredPredicate;
pub use transform::DeclaredTransform;
pub use unfold::DeclaredUnfold;

/// The six node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Pure function of inputs to outputs
    Transform,
    /// Boolean gate available to downstream `when` clauses
    Predicate,
    /// Side effects only
    Observer,
    /// Per-partition aggregation
    Fold,
    /// Parent-to-children expansion
    Unfold,
    /// Persistence sink
    Output,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Transform => "transform",
            NodeKind::Predicate => "predicate",
            NodeKind::Observer => "observer",
            NodeKind::Fold => "fold",
            NodeKind::Unfold => "unfold",
            NodeKind::Output => "output",
        };
        write!(f, "{name}")
    }
}

/// A registered graph node: a stateful executor the scheduler dispatches
/// stores to.
#[async_trait]
pub trait FlowNode: Send + Sync {
    /// Full `plugin:algorithm` name.
    fn full_name(&self) -> &str;

    /// Which of the six kinds this node is.
    fn kind(&self) -> NodeKind;

    /// Ordered input labels; length equals the algorithm arity.
    fn input_labels(&self) -> &[SpecifiedLabel];

    /// Names of gating predicates from the `when` clause.
    fn when(&self) -> &[String];

    /// Output product names.
    fn outputs(&self) -> &[String];

    /// Concurrency limit.
    fn concurrency(&self) -> Concurrency;

    /// Offer a store to the node; returns any newly published stores.
    async fn accept(
        &self,
        store: Arc<ProductStore>,
        ctx: Arc<ExecutionContext>,
    ) -> Vec<Arc<ProductStore>>;

    /// Access for gating lookups; predicates override this.
    fn as_predicate(self: Arc<Self>) -> Option<Arc<DeclaredPredicate>> {
        None
    }
}

/// Resolve every label to the nearest owning store, or `None` if any label
/// cannot be satisfied from this store.
pub(crate) fn resolve_inputs(
    store: &Arc<ProductStore>,
    labels: &[SpecifiedLabel],
) -> Option<Vec<Arc<ProductStore>>> {
    labels
        .iter()
        .map(|label| {
            store.store_for_product_from(label.name(), |owner| {
                label.accepts_producer(&AlgorithmName::parse(owner.source()))
            })
        })
        .collect()
}

/// Pick the execution store for a resolved input set: the most-derived of
/// the resolved stores. A node runs only when that store shares the
/// arriving store's id, which makes each invocation fire exactly once, at
/// the store where its deepest input appears.
pub(crate) fn execution_store(
    arriving: &Arc<ProductStore>,
    resolved: &[Arc<ProductStore>],
) -> Option<Arc<ProductStore>> {
    let chosen = most_derived_of(resolved)?;
    if chosen.id() == arriving.id() {
        Some(chosen)
    } else {
        None
    }
}

/// Outcome of evaluating a node's `when` set for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    /// Every gating predicate evaluated true.
    Pass,
    /// Some predicate evaluated false, failed, or was unresolvable; the
    /// store is short-circuited with no output.
    Skip,
}

/// Evaluate every gating predicate for the arriving store.
pub(crate) async fn evaluate_gate(
    node: &str,
    when: &[String],
    store: &Arc<ProductStore>,
    ctx: &Arc<ExecutionContext>,
) -> Gate {
    for name in when {
        let Some(gate) = ctx.gate(name) else {
            // Unknown names are rejected at composition; reaching this
            // means the context was built without the catalog's checks.
            ctx.record_error(format!(
                "node '{node}': unknown gating predicate '{name}'"
            ));
            return Gate::Skip;
        };
        let gate = Arc::clone(gate);
        match gate.evaluate_from(store, ctx).await {
            Some(true) => {},
            Some(false) | None => return Gate::Skip,
        }
    }
    Gate::Pass
}

/// Exactly-once bookkeeping: which ids a node has already run for.
#[derive(Debug, Default)]
pub(crate) struct InvocationLedger {
    completed: Mutex<HashSet<u64>>,
}

impl InvocationLedger {
    /// Claim the id; `false` if it was already claimed.
    pub(crate) fn try_claim(&self, id: &LevelId) -> bool {
        self.completed.lock().insert(id.hash())
    }
}

/// Shared attributes every declared node carries.
pub(crate) struct NodeCommon {
    pub full_name: String,
    pub labels: Vec<SpecifiedLabel>,
    pub when: Vec<String>,
    pub outputs: Vec<String>,
    pub limit: Concurrency,
}

/// Erased executor signatures shared by the node kinds.
pub(crate) type ErasedProducer =
    Box<dyn Fn(&ResolvedInputs<'_>) -> crate::core::Result<Vec<crate::model::ProductValue>> + Send + Sync>;
/// Erased predicate signature.
pub(crate) type ErasedPredicate =
    Box<dyn Fn(&ResolvedInputs<'_>) -> crate::core::Result<bool> + Send + Sync>;
/// Erased observer signature.
pub(crate) type ErasedObserver =
    Box<dyn Fn(&ResolvedInputs<'_>) -> crate::core::Result<()> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Products;
    use crate::products;

    #[test]
    fn test_resolve_inputs_walks_ancestors() {
        let base = ProductStore::base();
        let event = base.make_child(0, "event", "gen", products! { "x" => 1i32 });
        let cont = event.make_continuation("calib", products! { "y" => 2i32 });

        let labels = vec![SpecifiedLabel::parse("x"), SpecifiedLabel::parse("y")];
        let resolved = resolve_inputs(&cont, &labels).unwrap();
        assert!(Arc::ptr_eq(&resolved[0], &event));
        assert!(Arc::ptr_eq(&resolved[1], &cont));

        let labels = vec![SpecifiedLabel::parse("absent")];
        assert!(resolve_inputs(&cont, &labels).is_none());
    }

    #[test]
    fn test_execution_store_requires_matching_id() {
        let base = ProductStore::base();
        let event = base.make_child(0, "event", "gen", products! { "x" => 1i32 });
        let segment = event.make_child(0, "segment", "", Products::new());

        // At the event store the input is the deepest resolved store.
        let chosen = execution_store(&event, &[event.clone()]).unwrap();
        assert!(Arc::ptr_eq(&chosen, &event));

        // From a deeper store the same input resolves shallower: no run.
        assert!(execution_store(&segment, &[event.clone()]).is_none());
    }

    #[test]
    fn test_invocation_ledger_claims_once() {
        let ledger = InvocationLedger::default();
        let id = LevelId::base().make_child(0, "event");
        assert!(ledger.try_claim(&id));
        assert!(!ledger.try_claim(&id));
    }
}

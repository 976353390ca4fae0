//! Predicate nodes: boolean gates memoized per resolved id.
//!
//! A predicate evaluates at most once per id — whether demanded eagerly by
//! its own dispatch or lazily by a downstream `when` consumer — and every
//! caller observes the same cached result.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};

use super::{
    evaluate_gate, execution_store, resolve_inputs, ErasedPredicate, FlowNode, Gate, NodeCommon,
    NodeKind,
};
use crate::graph::algorithm::ResolvedInputs;
use crate::model::{ProductStore, SpecifiedLabel};
use crate::runtime::context::ExecutionContext;
use crate::runtime::permits::{Concurrency, PermitPool};

type ResultCell = Arc<OnceCell<Option<bool>>>;

/// A registered predicate.
pub struct DeclaredPredicate {
    common: NodeCommon,
    permits: PermitPool,
    results: Mutex<HashMap<u64, ResultCell>>,
    func: ErasedPredicate,
}

impl DeclaredPredicate {
    pub(crate) fn new(common: NodeCommon, func: ErasedPredicate) -> Self {
        let permits = PermitPool::new(common.limit);
        Self {
            common,
            permits,
            results: Mutex::new(HashMap::new()),
            func,
        }
    }

    /// Names this predicate can be referenced by in `when` clauses: its
    /// declared output products plus its own algorithm name.
    pub fn gate_aliases(&self) -> Vec<String> {
        let mut aliases = self.common.outputs.clone();
        let mut push = |alias: String| {
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        };
        push(self.common.full_name.clone());
        if let Some((_, bare)) = self.common.full_name.rsplit_once(':') {
            push(bare.to_string());
        }
        aliases
    }

    /// Evaluate for the store a downstream consumer arrived with.
    ///
    /// The result is keyed by the most-derived store among this
    /// predicate's resolved inputs — the same rule transforms use — so
    /// every consumer of the same id observes one evaluation. Returns
    /// `None` when the inputs cannot be resolved or the evaluation failed.
    pub async fn evaluate_from(
        self: &Arc<Self>,
        store: &Arc<ProductStore>,
        ctx: &Arc<ExecutionContext>,
    ) -> Option<bool> {
        if store.is_flush() {
            return None;
        }
        let resolved = resolve_inputs(store, &self.common.labels)?;
        let chosen = crate::model::most_derived_of(&resolved)?;
        let key = chosen.id().hash();

        let cell: ResultCell = {
            let mut results = self.results.lock().await;
            Arc::clone(results.entry(key).or_default())
        };
        let value = cell
            .get_or_init(|| async {
                let gate = Box::pin(evaluate_gate(
                    &self.common.full_name,
                    &self.common.when,
                    store,
                    ctx,
                ))
                .await;
                if gate == Gate::Skip {
                    return None;
                }
                let _permit = self.permits.acquire().await;
                let inputs = ResolvedInputs::new(&resolved, &self.common.labels);
                match (self.func)(&inputs) {
                    Ok(result) => {
                        tracing::debug!(
                            node = %self.common.full_name,
                            id = %chosen.id(),
                            result,
                            "predicate evaluated"
                        );
                        Some(result)
                    },
                    Err(err) => {
                        ctx.mark_failed(store, &self.common.full_name, &err);
                        None
                    },
                }
            })
            .await;
        *value
    }
}

#[async_trait]
impl FlowNode for DeclaredPredicate {
    fn full_name(&self) -> &str {
        &self.common.full_name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Predicate
    }

    fn input_labels(&self) -> &[SpecifiedLabel] {
        &self.common.labels
    }

    fn when(&self) -> &[String] {
        &self.common.when
    }

    fn outputs(&self) -> &[String] {
        &self.common.outputs
    }

    fn concurrency(&self) -> Concurrency {
        self.common.limit
    }

    async fn accept(
        &self,
        store: Arc<ProductStore>,
        ctx: Arc<ExecutionContext>,
    ) -> Vec<Arc<ProductStore>> {
        if store.is_flush() || ctx.is_failed(store.id()) {
            return Vec::new();
        }
        // Evaluate eagerly when the deepest input arrives; consumers that
        // got here first already populated the cache.
        if let Some(resolved) = resolve_inputs(&store, &self.common.labels) {
            if execution_store(&store, &resolved).is_some() {
                if let Some(this) = ctx.gate(&self.common.full_name) {
                    let this = Arc::clone(this);
                    this.evaluate_from(&store, &ctx).await;
                }
            }
        }
        Vec::new()
    }

    fn as_predicate(self: Arc<Self>) -> Option<Arc<DeclaredPredicate>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::products;

    fn counting_predicate(counter: Arc<AtomicUsize>) -> Arc<DeclaredPredicate> {
        let common = NodeCommon {
            full_name: "reco:is_positive".to_string(),
            labels: vec![SpecifiedLabel::parse("x")],
            when: Vec::new(),
            outputs: vec!["pos".to_string()],
            limit: Concurrency::Serial,
        };
        Arc::new(DeclaredPredicate::new(
            common,
            Box::new(move |inputs| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(*inputs.get::<i32>(0)? > 0)
            }),
        ))
    }

    #[test]
    fn test_gate_aliases_cover_outputs_and_names() {
        let predicate = counting_predicate(Arc::new(AtomicUsize::new(0)));
        let aliases = predicate.gate_aliases();
        assert!(aliases.contains(&"pos".to_string()));
        assert!(aliases.contains(&"reco:is_positive".to_string()));
        assert!(aliases.contains(&"is_positive".to_string()));
    }

    #[tokio::test]
    async fn test_evaluation_is_memoized_per_id() {
        let counter = Arc::new(AtomicUsize::new(0));
        let predicate = counting_predicate(counter.clone());
        let ctx = Arc::new(ExecutionContext::new(HashMap::new()));

        let event =
            ProductStore::base().make_child(0, "event", "gen", products! { "x" => 3i32 });
        assert_eq!(predicate.evaluate_from(&event, &ctx).await, Some(true));
        assert_eq!(predicate.evaluate_from(&event, &ctx).await, Some(true));
        // A continuation shares the id, so the cache still applies.
        let cont = event.make_continuation("calib", products! { "y" => 1i32 });
        assert_eq!(predicate.evaluate_from(&cont, &ctx).await, Some(true));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let negative =
            ProductStore::base().make_child(1, "event", "gen", products! { "x" => -1i32 });
        assert_eq!(predicate.evaluate_from(&negative, &ctx).await, Some(false));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_inputs_yield_none() {
        let predicate = counting_predicate(Arc::new(AtomicUsize::new(0)));
        let ctx = Arc::new(ExecutionContext::new(HashMap::new()));
        let empty = ProductStore::base().make_child(0, "event", "gen", Default::default());
        assert_eq!(predicate.evaluate_from(&empty, &ctx).await, None);
    }
}

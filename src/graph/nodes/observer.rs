//! Observer nodes: side effects only, never publish.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    evaluate_gate, execution_store, resolve_inputs, ErasedObserver, FlowNode, Gate,
    InvocationLedger, NodeCommon, NodeKind,
};
use crate::graph::algorithm::ResolvedInputs;
use crate::model::{ProductStore, SpecifiedLabel};
use crate::runtime::context::ExecutionContext;
use crate::runtime::permits::{Concurrency, PermitPool};

/// A registered observer.
pub struct DeclaredObserver {
    common: NodeCommon,
    permits: PermitPool,
    ledger: InvocationLedger,
    func: ErasedObserver,
}

impl DeclaredObserver {
    pub(crate) fn new(common: NodeCommon, func: ErasedObserver) -> Self {
        let permits = PermitPool::new(common.limit);
        Self {
            common,
            permits,
            ledger: InvocationLedger::default(),
            func,
        }
    }
}

#[async_trait]
impl FlowNode for DeclaredObserver {
    fn full_name(&self) -> &str {
        &self.common.full_name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Observer
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
        let Some(resolved) = resolve_inputs(&store, &self.common.labels) else {
            return Vec::new();
        };
        if execution_store(&store, &resolved).is_none() {
            return Vec::new();
        }
        if evaluate_gate(&self.common.full_name, &self.common.when, &store, &ctx).await
            == Gate::Skip
        {
            return Vec::new();
        }
        if !self.ledger.try_claim(store.id()) {
            return Vec::new();
        }

        let _permit = self.permits.acquire().await;
        let inputs = ResolvedInputs::new(&resolved, &self.common.labels);
        if let Err(err) = (self.func)(&inputs) {
            ctx.mark_failed(&store, &self.common.full_name, &err);
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;
    use crate::products;

    #[tokio::test]
    async fn test_observer_sees_each_id_once() {
        let seen = Arc::new(AtomicI64::new(0));
        let seen_in = seen.clone();
        let common = NodeCommon {
            full_name: "mon:tally".to_string(),
            labels: vec![SpecifiedLabel::parse("y")],
            when: Vec::new(),
            outputs: Vec::new(),
            limit: Concurrency::Serial,
        };
        let node = DeclaredObserver::new(
            common,
            Box::new(move |inputs| {
                seen_in.fetch_add(i64::from(*inputs.get::<i32>(0)?), Ordering::SeqCst);
                Ok(())
            }),
        );
        let ctx = Arc::new(ExecutionContext::new(HashMap::new()));

        let event =
            ProductStore::base().make_child(0, "event", "gen", products! { "y" => 4i32 });
        node.accept(event.clone(), ctx.clone()).await;
        node.accept(event.make_continuation("other", Default::default()), ctx)
            .await;
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }
}

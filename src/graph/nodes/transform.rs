//! Transform nodes: pure functions of inputs publishing output products.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    evaluate_gate, execution_store, resolve_inputs, ErasedProducer, FlowNode, Gate,
    InvocationLedger, NodeCommon, NodeKind,
};
use crate::graph::algorithm::ResolvedInputs;
use crate::model::{ProductStore, Products, SpecifiedLabel};
use crate::runtime::context::ExecutionContext;
use crate::runtime::permits::{Concurrency, PermitPool};

/// A registered transform.
pub struct DeclaredTransform {
    common: NodeCommon,
    permits: PermitPool,
    ledger: InvocationLedger,
    func: ErasedProducer,
}

impl DeclaredTransform {
    pub(crate) fn new(common: NodeCommon, func: ErasedProducer) -> Self {
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
impl FlowNode for DeclaredTransform {
    fn full_name(&self) -> &str {
        &self.common.full_name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Transform
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
        let Some(chosen) = execution_store(&store, &resolved) else {
            return Vec::new();
        };
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
        match (self.func)(&inputs) {
            Ok(values) => {
                let mut products = Products::new();
                for (name, value) in self.common.outputs.iter().zip(values) {
                    if let Err(err) = products.add(name.clone(), value) {
                        ctx.mark_failed(&store, &self.common.full_name, &err.into());
                        return Vec::new();
                    }
                }
                tracing::debug!(
                    node = %self.common.full_name,
                    id = %store.id(),
                    outputs = self.common.outputs.len(),
                    "transform published"
                );
                vec![chosen.make_continuation(&self.common.full_name, products)]
            },
            Err(err) => {
                ctx.mark_failed(&store, &self.common.full_name, &err);
                Vec::new()
            },
        }
    }
}

//! Unfold nodes: expand a parent store into children at a deeper level.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    evaluate_gate, execution_store, resolve_inputs, ErasedPredicate, ErasedProducer, FlowNode,
    Gate, InvocationLedger, NodeCommon, NodeKind,
};
use crate::graph::algorithm::ResolvedInputs;
use crate::model::{ProductStore, Products, SpecifiedLabel, Stage};
use crate::runtime::context::ExecutionContext;
use crate::runtime::permits::{Concurrency, PermitPool};

/// A registered unfold.
pub struct DeclaredUnfold {
    common: NodeCommon,
    permits: PermitPool,
    ledger: InvocationLedger,
    destination: String,
    predicate: ErasedPredicate,
    generate: ErasedProducer,
}

impl DeclaredUnfold {
    pub(crate) fn new(
        common: NodeCommon,
        destination: String,
        predicate: ErasedPredicate,
        generate: ErasedProducer,
    ) -> Self {
        let permits = PermitPool::new(common.limit);
        Self {
            common,
            permits,
            ledger: InvocationLedger::default(),
            destination,
            predicate,
            generate,
        }
    }

    /// The level name the children are emitted at.
    pub fn destination_data_layer(&self) -> &str {
        &self.destination
    }
}

#[async_trait]
impl FlowNode for DeclaredUnfold {
    fn full_name(&self) -> &str {
        &self.common.full_name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Unfold
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
        match (self.predicate)(&inputs) {
            Ok(false) => return Vec::new(),
            Ok(true) => {},
            Err(err) => {
                ctx.mark_failed(&store, &self.common.full_name, &err);
                return Vec::new();
            },
        }

        let payloads = match (self.generate)(&inputs) {
            Ok(payloads) => payloads,
            Err(err) => {
                ctx.mark_failed(&store, &self.common.full_name, &err);
                return Vec::new();
            },
        };

        let child_product = &self.common.outputs[0];
        let mut emitted = Vec::with_capacity(payloads.len() + 1);
        let count = payloads.len();
        for (number, payload) in payloads.into_iter().enumerate() {
            let mut products = Products::new();
            if let Err(err) = products.add(child_product.clone(), payload) {
                ctx.mark_failed(&store, &self.common.full_name, &err.into());
                return Vec::new();
            }
            emitted.push(chosen.make_child(
                number,
                &self.destination,
                &self.common.full_name,
                products,
            ));
        }
        // One flush per selected parent closes the child sequence.
        emitted.push(chosen.make_child_at(
            count,
            &self.destination,
            &self.common.full_name,
            Stage::Flush,
        ));
        tracing::debug!(
            node = %self.common.full_name,
            parent = %chosen.id(),
            children = count,
            layer = %self.destination,
            "unfold expanded"
        );
        emitted
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::products;

    fn hit_splitter() -> DeclaredUnfold {
        let common = NodeCommon {
            full_name: "split:to_segments".to_string(),
            labels: vec![SpecifiedLabel::parse("hits")],
            when: Vec::new(),
            outputs: vec!["hit".to_string()],
            limit: Concurrency::Serial,
        };
        DeclaredUnfold::new(
            common,
            "segment".to_string(),
            Box::new(|inputs| Ok(!inputs.get::<Vec<String>>(0)?.is_empty())),
            Box::new(|inputs| {
                Ok(inputs
                    .get::<Vec<String>>(0)?
                    .iter()
                    .cloned()
                    .map(crate::model::ProductValue::new)
                    .collect())
            }),
        )
    }

    #[tokio::test]
    async fn test_unfold_emits_children_then_flush() {
        let unfold = hit_splitter();
        let ctx = Arc::new(ExecutionContext::new(HashMap::new()));
        let event = ProductStore::base().make_child(
            0,
            "event",
            "gen",
            products! { "hits" => vec!["a".to_string(), "b".to_string(), "c".to_string()] },
        );

        let out = unfold.accept(event.clone(), ctx).await;
        assert_eq!(out.len(), 4);
        for (n, child) in out[..3].iter().enumerate() {
            assert_eq!(child.level_name(), "segment");
            assert_eq!(child.id().number(), n);
            assert!(!child.is_flush());
            assert!(child.contains_product("hit"));
            assert!(Arc::ptr_eq(child.parent().unwrap(), &event));
        }
        assert!(out[3].is_flush());
        assert_eq!(out[3].level_name(), "segment");
        assert_eq!(out[0].get_product::<String>("hit").unwrap(), "a");
    }

    #[tokio::test]
    async fn test_unfold_respects_selection_predicate() {
        let unfold = hit_splitter();
        let ctx = Arc::new(ExecutionContext::new(HashMap::new()));
        let event = ProductStore::base().make_child(
            0,
            "event",
            "gen",
            products! { "hits" => Vec::<String>::new() },
        );
        assert!(unfold.accept(event, ctx).await.is_empty());
    }
}

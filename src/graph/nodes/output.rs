//! Output nodes: hand stores to user persistence.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Result;

use super::{evaluate_gate, FlowNode, Gate, NodeCommon, NodeKind};
use crate::model::{ProductStore, SpecifiedLabel};
use crate::runtime::context::ExecutionContext;
use crate::runtime::permits::{Concurrency, PermitPool};

/// Erased persistence callback.
pub(crate) type ErasedOutput = Box<dyn Fn(&ProductStore) -> Result<()> + Send + Sync>;

/// A registered output.
///
/// Outputs receive every process store that clears their gate — including
/// continuations — and decide themselves what to persist; they publish
/// nothing.
pub struct DeclaredOutput {
    common: NodeCommon,
    permits: PermitPool,
    func: ErasedOutput,
}

impl DeclaredOutput {
    pub(crate) fn new(common: NodeCommon, func: ErasedOutput) -> Self {
        let permits = PermitPool::new(common.limit);
        Self {
            common,
            permits,
            func,
        }
    }
}

#[async_trait]
impl FlowNode for DeclaredOutput {
    fn full_name(&self) -> &str {
        &self.common.full_name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Output
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
        if store.products().is_empty() {
            return Vec::new();
        }
        if evaluate_gate(&self.common.full_name, &self.common.when, &store, &ctx).await
            == Gate::Skip
        {
            return Vec::new();
        }

        let _permit = self.permits.acquire().await;
        if let Err(err) = (self.func)(&store) {
            ctx.mark_failed(&store, &self.common.full_name, &err);
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::products;

    #[tokio::test]
    async fn test_output_writes_each_store_with_products() {
        let written: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = written.clone();
        let common = NodeCommon {
            full_name: "io:writer".to_string(),
            labels: Vec::new(),
            when: Vec::new(),
            outputs: Vec::new(),
            limit: Concurrency::Serial,
        };
        let node = DeclaredOutput::new(
            common,
            Box::new(move |store| {
                for (name, _) in store.products().iter() {
                    sink.lock().push(format!("{}@{}", name, store.id()));
                }
                Ok(())
            }),
        );
        let ctx = Arc::new(ExecutionContext::new(HashMap::new()));

        let event =
            ProductStore::base().make_child(0, "event", "gen", products! { "x" => 1i32 });
        node.accept(event.clone(), ctx.clone()).await;
        let cont = event.make_continuation("reco:double", products! { "y" => 2i32 });
        node.accept(cont, ctx.clone()).await;
        node.accept(event.make_flush(), ctx).await;

        let written = written.lock();
        assert_eq!(
            *written,
            vec![
                "x@job:0/event:0".to_string(),
                "y@job:0/event:0".to_string()
            ]
        );
    }
}

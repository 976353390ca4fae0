//! Fold nodes: per-partition aggregation with flush-triggered finalization.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::Result;

use super::{
    evaluate_gate, execution_store, resolve_inputs, FlowNode, Gate, InvocationLedger, NodeCommon,
    NodeKind,
};
use crate::graph::algorithm::ResolvedInputs;
use crate::model::{ProductStore, ProductValue, Products, SpecifiedLabel};
use crate::runtime::context::ExecutionContext;
use crate::runtime::permits::{Concurrency, PermitPool};

type ErasedState = Box<dyn Any + Send>;
type PartitionSlot = Arc<Mutex<Option<ErasedState>>>;

/// Erased per-partition initial-state factory.
pub(crate) type ErasedInit = Box<dyn Fn() -> ErasedState + Send + Sync>;
/// Erased combiner.
pub(crate) type ErasedCombine =
    Box<dyn Fn(&mut ErasedState, &ResolvedInputs<'_>) -> Result<()> + Send + Sync>;
/// Erased finalizer.
pub(crate) type ErasedFinalize = Box<dyn Fn(ErasedState) -> Result<ProductValue> + Send + Sync>;

/// A registered fold.
pub struct DeclaredFold {
    common: NodeCommon,
    permits: PermitPool,
    ledger: InvocationLedger,
    partition: String,
    init: ErasedInit,
    combine: ErasedCombine,
    finalize: ErasedFinalize,
    partitions: Mutex<HashMap<u64, PartitionSlot>>,
}

impl DeclaredFold {
    pub(crate) fn new(
        common: NodeCommon,
        partition: String,
        init: ErasedInit,
        combine: ErasedCombine,
        finalize: ErasedFinalize,
    ) -> Self {
        let permits = PermitPool::new(common.limit);
        Self {
            common,
            permits,
            ledger: InvocationLedger::default(),
            partition,
            init,
            combine,
            finalize,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    /// The level name this fold partitions by.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    fn slot_for(&self, key: u64) -> PartitionSlot {
        let mut partitions = self.partitions.lock();
        Arc::clone(
            partitions
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(Some((self.init)())))),
        )
    }

    async fn accumulate(
        &self,
        store: &Arc<ProductStore>,
        resolved: Vec<Arc<ProductStore>>,
        ctx: &Arc<ExecutionContext>,
    ) {
        let Some(partition_store) = store.ancestor_at(&self.partition) else {
            ctx.record_error(format!(
                "fold '{}': no '{}' ancestor for {}",
                self.common.full_name,
                self.partition,
                store.id()
            ));
            return;
        };
        let slot = self.slot_for(partition_store.id().hash());

        let _permit = self.permits.acquire().await;
        let inputs = ResolvedInputs::new(&resolved, &self.common.labels);
        // Per-partition serialization: invocations for one key combine
        // under the slot lock, in arrival order.
        let mut guard = slot.lock();
        let Some(state) = guard.as_mut() else {
            // Partition already finalized; late arrivals are a protocol
            // violation upstream.
            ctx.record_error(format!(
                "fold '{}': input after flush for partition {}",
                self.common.full_name,
                partition_store.id()
            ));
            return;
        };
        if let Err(err) = (self.combine)(state, &inputs) {
            drop(guard);
            ctx.mark_failed(store, &self.common.full_name, &err);
        }
    }

    async fn finalize_partition(
        &self,
        flush: &Arc<ProductStore>,
        ctx: &Arc<ExecutionContext>,
    ) -> Vec<Arc<ProductStore>> {
        if flush.level_name() != self.partition {
            return Vec::new();
        }
        let slot = {
            let mut partitions = self.partitions.lock();
            partitions.remove(&flush.id().hash())
        };
        let Some(slot) = slot else {
            // No inputs were observed for this partition instance.
            return Vec::new();
        };
        let Some(state) = slot.lock().take() else {
            return Vec::new();
        };

        let _permit = self.permits.acquire().await;
        match (self.finalize)(state) {
            Ok(value) => {
                let mut products = Products::new();
                if let Err(err) = products.add(self.common.outputs[0].clone(), value) {
                    ctx.mark_failed(flush, &self.common.full_name, &err.into());
                    return Vec::new();
                }
                tracing::debug!(
                    node = %self.common.full_name,
                    partition = %flush.id(),
                    "fold finalized"
                );
                vec![flush.make_continuation(&self.common.full_name, products)]
            },
            Err(err) => {
                ctx.mark_failed(flush, &self.common.full_name, &err);
                Vec::new()
            },
        }
    }
}

#[async_trait]
impl FlowNode for DeclaredFold {
    fn full_name(&self) -> &str {
        &self.common.full_name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Fold
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
        if store.is_flush() {
            // Finalization bypasses predicate gating and runs even when
            // some inputs failed: the published value is the accumulation
            // of the successful invocations.
            return self.finalize_partition(&store, &ctx).await;
        }
        if ctx.is_failed(store.id()) {
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
        self.accumulate(&store, resolved, &ctx).await;
        Vec::new()
    }
}

//! The flow engine.
//!
//! Stores are broadcast to every node in registration order; each node task
//! runs under its own permit pool, and whatever the nodes publish —
//! continuations, unfold children, sequence flushes — is dispatched
//! recursively. A process store's entire downstream is finished before
//! `process_store` returns, which is what lets the driver order flush
//! stores after all the work they close over.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;

use crate::graph::nodes::FlowNode;
use crate::model::ProductStore;

use super::context::ExecutionContext;

/// Executes a composed graph against dispatched stores.
pub struct FlowEngine {
    nodes: Vec<Arc<dyn FlowNode>>,
    ctx: Arc<ExecutionContext>,
}

type DispatchFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

impl FlowEngine {
    /// Wrap the composed nodes with the shared execution context.
    pub fn new(nodes: Vec<Arc<dyn FlowNode>>, ctx: Arc<ExecutionContext>) -> Self {
        Self { nodes, ctx }
    }

    /// The shared execution context.
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    /// Dispatch a process store and everything it causes downstream.
    ///
    /// Nodes run concurrently for the store; published stores are then
    /// dispatched in registration order. Returns only when the whole
    /// subtree is quiescent.
    pub fn process_store(self: Arc<Self>, store: Arc<ProductStore>) -> DispatchFuture {
        Box::pin(async move {
            if self.ctx.is_shutdown() {
                return;
            }
            // Continuations share their parent's id; only new level
            // instances count toward the hierarchy report.
            let new_instance = match store.parent() {
                None => true,
                Some(parent) => parent.id() != store.id(),
            };
            if new_instance {
                self.ctx.hierarchy().increment(store.id());
            }
            self.ctx.count_store();
            tracing::trace!(id = %store.id(), source = %store.source(), "dispatching store");

            let mut handles = Vec::with_capacity(self.nodes.len());
            for node in &self.nodes {
                if self.ctx.is_shutdown() {
                    break;
                }
                let node = Arc::clone(node);
                let store = Arc::clone(&store);
                let ctx = Arc::clone(&self.ctx);
                handles.push(tokio::spawn(
                    async move { node.accept(store, ctx).await },
                ));
            }

            let mut published = Vec::new();
            for joined in join_all(handles).await {
                match joined {
                    Ok(stores) => published.extend(stores),
                    Err(err) => {
                        self.ctx
                            .record_error(format!("node task aborted: {err}"));
                    },
                }
            }
            for store in published {
                if store.is_flush() {
                    Arc::clone(&self).flush_store(store).await;
                } else {
                    Arc::clone(&self).process_store(store).await;
                }
            }
        })
    }

    /// Deliver a flush store: nodes see it sequentially in registration
    /// order, and fold finalizations it publishes are dispatched in place.
    ///
    /// Callers must have quiesced the process stores the flush closes over.
    pub fn flush_store(self: Arc<Self>, store: Arc<ProductStore>) -> DispatchFuture {
        Box::pin(async move {
            tracing::trace!(id = %store.id(), "dispatching flush");
            for node in &self.nodes {
                let outs = node
                    .accept(Arc::clone(&store), Arc::clone(&self.ctx))
                    .await;
                for out in outs {
                    if out.is_flush() {
                        Arc::clone(&self).flush_store(out).await;
                    } else {
                        Arc::clone(&self).process_store(out).await;
                    }
                }
            }
        })
    }
}

//! The source driver and execution entry point.
//!
//! [`execute`] composes the graph (refusing on accumulated errors), then
//! pulls stores from the source, seeds them under back-pressure, and at end
//! of source closes every open level instance deepest first so folds
//! finalize bottom-up.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::core::error::{PhlexError, Result};
use crate::graph::flow::{compose, ComposedGraph};
use crate::graph::PipelineGraph;
use crate::model::ProductStore;
use crate::source::Source;

use super::context::ExecutionContext;
use super::engine::FlowEngine;
use super::watermark::Watermark;

/// Tunables for one execution.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// In-flight seeded stores above which the source blocks.
    pub high_water: usize,
    /// In-flight count below which the source resumes.
    pub low_water: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let high_water = (num_cpus::get() * 4).max(4);
        Self {
            high_water,
            low_water: high_water / 2,
        }
    }
}

/// End-of-run report.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    /// SHA-256 digest of the composed graph.
    pub digest: String,
    /// Observed `(level_name, instance_count)` pairs, parents first.
    pub level_counts: Vec<(String, u64)>,
    /// Process stores dispatched, continuations included.
    pub stores_processed: u64,
    /// Execution error log.
    pub errors: Vec<String>,
    /// Rendered ids marked failed, in failure order.
    pub failed_ids: Vec<String>,
}

/// Handle the source publishes stores through.
#[derive(Debug, Default)]
pub struct FrameworkDriver {
    yielded: Vec<Arc<ProductStore>>,
    finished: bool,
    shutdown_requested: bool,
}

impl FrameworkDriver {
    /// A fresh driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a store into the graph.
    pub fn yield_store(&mut self, store: Arc<ProductStore>) {
        self.yielded.push(store);
    }

    /// Declare the source exhausted.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Whether the source declared itself exhausted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Ask for cooperative shutdown: no further stores are pulled,
    /// in-flight invocations run to completion, open levels still flush.
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub(crate) fn take_yielded(&mut self) -> Vec<Arc<ProductStore>> {
        std::mem::take(&mut self.yielded)
    }
}

/// Compose and run the pipeline to completion.
///
/// Refused with the accumulated messages while the catalog holds errors.
/// Per-id node failures do not abort the run; they are reported in the
/// summary.
pub async fn execute<S: Source>(
    graph: PipelineGraph,
    source: S,
    options: ExecutionOptions,
) -> Result<ExecutionSummary> {
    let catalog = graph.catalog();
    let composed = {
        let catalog = catalog.lock();
        compose(&catalog)
    }
    .map_err(|messages| PhlexError::Configuration { messages })?;

    let ComposedGraph {
        nodes,
        gates,
        products,
        source_products,
        digest,
    } = composed;
    if !source_products.is_empty() {
        tracing::debug!(products = ?source_products, "inputs expected from the source");
    }
    for product in &products {
        tracing::debug!(product = %product, "declared output");
    }

    let ctx = Arc::new(ExecutionContext::new(gates));
    let engine = Arc::new(FlowEngine::new(nodes, Arc::clone(&ctx)));
    let watermark = Arc::new(Watermark::new(options.high_water, options.low_water));

    let mut driver = FrameworkDriver::new();
    let mut source = source;
    let mut inflight: JoinSet<()> = JoinSet::new();
    // Every seeded process store stays open until the end-of-source flush.
    let mut open: Vec<Arc<ProductStore>> = Vec::new();

    loop {
        if ctx.is_shutdown() {
            break;
        }
        if let Err(err) = source.next(&mut driver) {
            // Record and stop pulling; open levels are still flushed below.
            ctx.record_error(format!("source failed: {err}"));
            break;
        }
        let batch = driver.take_yielded();
        let finished = driver.is_finished();
        let exhausted = batch.is_empty() && !finished;
        for store in batch {
            if store.is_flush() {
                // Everything the flush closes over must be quiescent first.
                drain(&mut inflight, &ctx).await;
                Arc::clone(&engine).flush_store(store).await;
            } else {
                watermark.acquire().await;
                open.push(Arc::clone(&store));
                let engine = Arc::clone(&engine);
                let watermark = Arc::clone(&watermark);
                inflight.spawn(async move {
                    engine.process_store(store).await;
                    watermark.release();
                });
            }
        }
        if driver.shutdown_requested() {
            tracing::info!("source requested shutdown; flushing open levels");
            break;
        }
        if finished {
            break;
        }
        if exhausted {
            // A next() that publishes nothing is treated as exhaustion.
            tracing::debug!("source yielded nothing; treating as exhausted");
            break;
        }
    }

    drain(&mut inflight, &ctx).await;

    // Close open level instances in reverse depth order; the sort is
    // stable, so instances at one depth flush in seed order.
    open.sort_by(|a, b| b.id().depth().cmp(&a.id().depth()));
    for store in &open {
        Arc::clone(&engine).flush_store(store.make_flush()).await;
    }

    ctx.hierarchy().log_layout();
    let summary = ExecutionSummary {
        digest,
        level_counts: ctx.hierarchy().counts(),
        stores_processed: ctx.stores_processed(),
        errors: ctx.errors(),
        failed_ids: ctx.failed_ids(),
    };
    tracing::info!(
        stores = summary.stores_processed,
        errors = summary.errors.len(),
        failed_ids = summary.failed_ids.len(),
        "execution complete"
    );
    Ok(summary)
}

async fn drain(inflight: &mut JoinSet<()>, ctx: &Arc<ExecutionContext>) {
    while let Some(joined) = inflight.join_next().await {
        if let Err(err) = joined {
            ctx.record_error(format!("seeded store task aborted: {err}"));
        }
    }
}

//! The scheduler: permits, gating, back-pressure, the flow engine, and the
//! source driver.
//!
//! Work is dispatched as tokio tasks over the composed graph. Per-node
//! permit pools bound concurrency, the watermark gate throttles the source,
//! and the driver orders flush stores after the work they close over so
//! folds finalize with complete partitions.

pub mod context;
pub mod driver;
pub mod engine;
pub mod permits;
pub mod watermark;

pub use context::ExecutionContext;
pub use driver::{execute, ExecutionOptions, ExecutionSummary, FrameworkDriver};
pub use engine::FlowEngine;
pub use permits::{Concurrency, PermitPool};
pub use watermark::Watermark;

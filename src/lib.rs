//! # phlex-core
//!
//! A dataflow-graph runtime for hierarchical, streaming event-processing
//! pipelines.
//!
//! A pipeline is declared as a graph of named algorithms — transforms,
//! predicates, folds, unfolds, observers, and outputs — that communicate by
//! publishing and consuming named *products* keyed by a hierarchical *level
//! identifier* (e.g. `job → run → event`). The framework resolves data
//! dependencies by product name, composes a concurrent task graph, drives
//! it from a user source, and closes every level with a flush protocol that
//! finalizes folds.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use phlex_core::config::Configuration;
//! use phlex_core::graph::{Concurrency, PipelineGraph};
//! use phlex_core::model::ProductStore;
//! use phlex_core::products;
//! use phlex_core::runtime::{execute, ExecutionOptions};
//! use phlex_core::source::StoreSequence;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> phlex_core::Result<()> {
//! let graph = PipelineGraph::new(Configuration::with_plugin("demo"));
//! let mut g = graph.proxy();
//! g.transform("double", |x: &i32| (2 * x,), Concurrency::Unlimited)
//!     .input_family(["x"])
//!     .output_products(["y"]);
//!
//! let base = ProductStore::base();
//! let event = base.make_child(0, "event", "gen", products! { "x" => 21i32 });
//! let source = StoreSequence::new([base, event]);
//!
//! let summary = execute(graph, source, ExecutionOptions::default()).await?;
//! assert!(summary.errors.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Configuration surface: name defaults, opaque per-node parameters,
/// persistence output items
pub mod config;
/// Central error type and `Result` alias
pub mod core;
/// Graph composition: catalog, registrar, typed proxy, node kinds
pub mod graph;
/// Data model: names, level ids, products, the store hierarchy
pub mod model;
/// Module and source registration entry points
pub mod module;
/// Persistence contract consumed by output nodes
pub mod persistence;
/// Scheduler: permits, back-pressure, flow engine, source driver
pub mod runtime;
/// The source interface and adapters
pub mod source;

pub use crate::core::{ErrorContext, PhlexError, Result};
pub use config::Configuration;
pub use graph::{Concurrency, GraphProxy, PipelineGraph};
pub use model::{LevelId, ProductStore, ProductValue, Products, Stage};
pub use runtime::{execute, ExecutionOptions, ExecutionSummary, FrameworkDriver};
pub use source::{SimpleNext, SimpleSource, Source, StoreSequence};

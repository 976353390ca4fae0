//! The typed registration facade.
//!
//! A [`GraphProxy`] turns user functions into declared nodes through chained
//! statements:
//!
//! ```
//! use phlex_core::graph::{Concurrency, PipelineGraph};
//! use phlex_core::config::Configuration;
//!
//! let graph = PipelineGraph::new(Configuration::with_plugin("demo"));
//! let mut g = graph.proxy();
//! g.predicate("is_positive", |x: &i32| *x > 0, Concurrency::Unlimited)
//!     .input_family(["x"])
//!     .output_products(["pos"]);
//! g.transform("double", |x: &i32| (2 * x,), Concurrency::Unlimited)
//!     .input_family(["x"])
//!     .when(["pos"])
//!     .output_products(["y"]);
//! ```
//!
//! Each statement registers its node exactly once when the chain ends; the
//! intermediate builders carry the registrar along, so every fluent option
//! before the statement terminator is observed.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use super::algorithm::{
    BoundObserverFn, BoundPredicateFn, BoundTransformFn, FoldFn, IntoUnitResult, ObserverFn,
    PredicateFn, TransformFn, UnfoldFn,
};
use super::catalog::NodeCatalog;
use super::nodes::fold::{ErasedCombine, ErasedFinalize, ErasedInit};
use super::nodes::output::ErasedOutput;
use super::nodes::{
    DeclaredFold, DeclaredObserver, DeclaredOutput, DeclaredPredicate, DeclaredTransform,
    DeclaredUnfold, ErasedObserver, ErasedPredicate, ErasedProducer, FlowNode, NodeCommon,
};
use super::registrar::{OutputsRule, Registrar};
use crate::config::Configuration;
use crate::core::error::PhlexError;
use crate::model::{ProductStore, ProductValue, SpecifiedLabel};
use crate::runtime::permits::Concurrency;

type NodeBuilder = Box<dyn FnOnce(NodeCommon) -> Arc<dyn FlowNode> + Send>;

struct PendingNode {
    full_name: String,
    limit: Concurrency,
    arity: usize,
    outputs_rule: OutputsRule,
    build: NodeBuilder,
}

fn finish_input_family(
    catalog: Arc<Mutex<NodeCatalog>>,
    pending: PendingNode,
    labels: Vec<SpecifiedLabel>,
) -> UpstreamPredicates {
    let mut registrar = Registrar::new(catalog, pending.full_name.clone(), pending.outputs_rule);
    if labels.len() != pending.arity {
        registrar.record_error(format!(
            "node '{}': {} input(s) expected from the algorithm signature, {} label(s) specified",
            pending.full_name,
            pending.arity,
            labels.len()
        ));
        return UpstreamPredicates { registrar };
    }
    let full_name = pending.full_name;
    let limit = pending.limit;
    let build = pending.build;
    registrar.set_creator(Box::new(move |when, outputs| {
        build(NodeCommon {
            full_name,
            labels,
            when,
            outputs,
            limit,
        })
    }));
    UpstreamPredicates { registrar }
}

/// Builder stage produced by `input_family`; accepts `when` and
/// `output_products`. Leaving the statement registers the node with
/// whatever options were chained.
pub struct UpstreamPredicates {
    registrar: Registrar,
}

impl UpstreamPredicates {
    /// Gate the node on upstream predicates.
    pub fn when<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.registrar
            .set_predicates(names.into_iter().map(Into::into).collect());
        self
    }

    /// Name the output products and register the node.
    pub fn output_products<I>(mut self, names: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.registrar
            .fire_with_outputs(names.into_iter().map(Into::into).collect());
    }
}

/// Builder stage produced by a declaration; accepts `input_family`.
#[must_use = "call input_family to finish the declaration"]
pub struct InputFamily {
    catalog: Arc<Mutex<NodeCatalog>>,
    pending: Option<PendingNode>,
}

impl InputFamily {
    /// Supply the input labels, one per algorithm argument.
    pub fn input_family<I>(mut self, labels: I) -> UpstreamPredicates
    where
        I: IntoIterator,
        I::Item: Into<SpecifiedLabel>,
    {
        let Some(pending) = self.pending.take() else {
            // Unreachable: input_family consumes the builder.
            let registrar = Registrar::new(
                Arc::clone(&self.catalog),
                String::new(),
                OutputsRule::NotAccepted,
            );
            return UpstreamPredicates { registrar };
        };
        let labels = labels.into_iter().map(Into::into).collect();
        finish_input_family(Arc::clone(&self.catalog), pending, labels)
    }
}

impl Drop for InputFamily {
    fn drop(&mut self) {
        if let Some(pending) = &self.pending {
            self.catalog.lock().record_error(format!(
                "node '{}': declaration ended without input_family",
                pending.full_name
            ));
        }
    }
}

/// Fold declaration stage: optional finalizer, then `input_family`.
#[must_use = "call input_family to finish the declaration"]
pub struct FoldInputFamily<S> {
    inner: InputFamily,
    finalize: Arc<Mutex<Option<ErasedFinalize>>>,
    _state: PhantomData<fn() -> S>,
}

impl<S: Send + Sync + 'static> FoldInputFamily<S> {
    /// Map the accumulated state through `finalizer` before publication.
    pub fn with_finalizer<O, Fin>(self, finalizer: Fin) -> Self
    where
        O: Send + Sync + 'static,
        Fin: Fn(&S) -> O + Send + Sync + 'static,
    {
        *self.finalize.lock() = Some(Box::new(move |state| {
            match state.downcast::<S>() {
                Ok(state) => Ok(ProductValue::new(finalizer(&state))),
                Err(_) => Err(PhlexError::Registration {
                    message: "fold finalizer received a foreign state type".to_string(),
                }),
            }
        }));
        self
    }

    /// Supply the input labels, one per combiner argument after the state.
    pub fn input_family<I>(self, labels: I) -> UpstreamPredicates
    where
        I: IntoIterator,
        I::Item: Into<SpecifiedLabel>,
    {
        self.inner.input_family(labels)
    }
}

/// Output declaration stage: accepts `when` only; leaving the statement
/// registers the node.
pub struct OutputApi {
    registrar: Registrar,
}

impl OutputApi {
    /// Gate the output on upstream predicates.
    pub fn when<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.registrar
            .set_predicates(names.into_iter().map(Into::into).collect());
        self
    }
}

/// The unbound registration facade.
pub struct GraphProxy {
    config: Arc<Configuration>,
    catalog: Arc<Mutex<NodeCatalog>>,
}

impl GraphProxy {
    pub(crate) fn new(config: Arc<Configuration>, catalog: Arc<Mutex<NodeCatalog>>) -> Self {
        Self { config, catalog }
    }

    fn full_name(&self, declared: &str) -> String {
        self.config.resolve_name(declared).full()
    }

    fn declare(
        &self,
        full_name: String,
        limit: Concurrency,
        arity: usize,
        outputs_rule: OutputsRule,
        build: NodeBuilder,
    ) -> InputFamily {
        InputFamily {
            catalog: Arc::clone(&self.catalog),
            pending: Some(PendingNode {
                full_name,
                limit,
                arity,
                outputs_rule,
                build,
            }),
        }
    }

    /// Declare a transform: pure inputs to a tuple of outputs.
    pub fn transform<F, Args>(&mut self, name: &str, f: F, limit: Concurrency) -> InputFamily
    where
        F: TransformFn<Args>,
    {
        let arity = f.arity();
        let outputs_rule = OutputsRule::Exactly(f.output_count());
        let func: ErasedProducer = Box::new(move |inputs| f.invoke(inputs));
        self.declare(
            self.full_name(name),
            limit,
            arity,
            outputs_rule,
            Box::new(move |common| Arc::new(DeclaredTransform::new(common, func))),
        )
    }

    /// Declare a predicate; its output name (or its own name) becomes a
    /// gating condition for downstream `when` clauses.
    pub fn predicate<F, Args>(&mut self, name: &str, f: F, limit: Concurrency) -> InputFamily
    where
        F: PredicateFn<Args>,
    {
        let arity = f.arity();
        let func: ErasedPredicate = Box::new(move |inputs| f.invoke(inputs));
        self.declare(
            self.full_name(name),
            limit,
            arity,
            OutputsRule::AtMostOne,
            Box::new(move |common| Arc::new(DeclaredPredicate::new(common, func))),
        )
    }

    /// Declare an observer: side effects only.
    pub fn observe<F, Args>(&mut self, name: &str, f: F, limit: Concurrency) -> InputFamily
    where
        F: ObserverFn<Args>,
    {
        let arity = f.arity();
        let func: ErasedObserver = Box::new(move |inputs| f.invoke(inputs));
        self.declare(
            self.full_name(name),
            limit,
            arity,
            OutputsRule::Exactly(0),
            Box::new(move |common| Arc::new(DeclaredObserver::new(common, func))),
        )
    }

    /// Declare a fold over `partition`, seeded with `init`.
    pub fn fold<S, F, Args>(
        &mut self,
        name: &str,
        combiner: F,
        limit: Concurrency,
        partition: &str,
        init: S,
    ) -> FoldInputFamily<S>
    where
        S: Clone + Send + Sync + 'static,
        F: FoldFn<S, Args>,
    {
        let arity = combiner.arity();
        let full_name = self.full_name(name);
        let partition = partition.to_string();

        let init_factory: ErasedInit = Box::new(move || Box::new(init.clone()));
        let combine: ErasedCombine = Box::new(move |state, inputs| {
            let Some(state) = state.downcast_mut::<S>() else {
                return Err(PhlexError::Registration {
                    message: "fold combiner received a foreign state type".to_string(),
                });
            };
            combiner.invoke(state, inputs)
        });
        let finalize: Arc<Mutex<Option<ErasedFinalize>>> = Arc::new(Mutex::new(None));
        let finalize_slot = Arc::clone(&finalize);

        let inner = self.declare(
            full_name,
            limit,
            arity,
            OutputsRule::Exactly(1),
            Box::new(move |common| {
                let finalize = finalize_slot.lock().take().unwrap_or_else(|| {
                    Box::new(|state: Box<dyn std::any::Any + Send>| {
                        match state.downcast::<S>() {
                            Ok(state) => Ok(ProductValue::new(*state)),
                            Err(_) => Err(PhlexError::Registration {
                                message: "fold finalizer received a foreign state type"
                                    .to_string(),
                            }),
                        }
                    })
                });
                Arc::new(DeclaredFold::new(
                    common,
                    partition,
                    init_factory,
                    combine,
                    finalize,
                ))
            }),
        );
        FoldInputFamily {
            inner,
            finalize,
            _state: PhantomData,
        }
    }

    /// Declare an unfold into `destination_data_layer`: for every parent
    /// where `predicate` holds, `generator` yields one child payload per
    /// element.
    pub fn unfold<P, G, Args>(
        &mut self,
        name: &str,
        predicate: P,
        generator: G,
        limit: Concurrency,
        destination_data_layer: &str,
    ) -> InputFamily
    where
        P: PredicateFn<Args>,
        G: UnfoldFn<Args>,
    {
        let arity = generator.arity();
        let destination = destination_data_layer.to_string();
        let pred: ErasedPredicate = Box::new(move |inputs| predicate.invoke(inputs));
        let expand: ErasedProducer = Box::new(move |inputs| generator.invoke(inputs));
        self.declare(
            self.full_name(name),
            limit,
            arity,
            OutputsRule::Exactly(1),
            Box::new(move |common| {
                Arc::new(DeclaredUnfold::new(common, destination, pred, expand))
            }),
        )
    }

    /// Declare an output: user persistence invoked per matching store.
    pub fn output<F, R>(&mut self, name: &str, f: F, limit: Concurrency) -> OutputApi
    where
        F: Fn(&ProductStore) -> R + Send + Sync + 'static,
        R: IntoUnitResult,
    {
        let full_name = self.full_name(name);
        let func: ErasedOutput = Box::new(move |store| f(store).into_unit_result());
        let mut registrar = Registrar::new(
            Arc::clone(&self.catalog),
            full_name.clone(),
            OutputsRule::NotAccepted,
        );
        registrar.set_creator(Box::new(move |when, outputs| {
            Arc::new(DeclaredOutput::new(
                NodeCommon {
                    full_name,
                    labels: Vec::new(),
                    when,
                    outputs,
                    limit,
                },
                func,
            ))
        }));
        OutputApi { registrar }
    }

    /// Bind a shared algorithm instance; declarations on the returned proxy
    /// dispatch against it. The unbound proxy has no member surface.
    pub fn make<T: Send + Sync + 'static>(&mut self, instance: T) -> BoundProxy<T> {
        BoundProxy {
            config: Arc::clone(&self.config),
            catalog: Arc::clone(&self.catalog),
            instance: Arc::new(instance),
        }
    }
}

/// Registration facade bound to a shared algorithm instance.
pub struct BoundProxy<T> {
    config: Arc<Configuration>,
    catalog: Arc<Mutex<NodeCatalog>>,
    instance: Arc<T>,
}

impl<T: Send + Sync + 'static> BoundProxy<T> {
    /// The shared instance declarations dispatch against.
    pub fn instance(&self) -> &Arc<T> {
        &self.instance
    }

    fn unbound(&self) -> GraphProxy {
        GraphProxy {
            config: Arc::clone(&self.config),
            catalog: Arc::clone(&self.catalog),
        }
    }

    /// Declare a transform method against the bound instance.
    pub fn transform<M, Args>(&mut self, name: &str, method: M, limit: Concurrency) -> InputFamily
    where
        M: BoundTransformFn<T, Args>,
    {
        let proxy = self.unbound();
        let arity = method.arity();
        let outputs_rule = OutputsRule::Exactly(method.output_count());
        let instance = Arc::clone(&self.instance);
        let func: ErasedProducer = Box::new(move |inputs| method.invoke(&instance, inputs));
        proxy.declare(
            proxy.full_name(name),
            limit,
            arity,
            outputs_rule,
            Box::new(move |common| Arc::new(DeclaredTransform::new(common, func))),
        )
    }

    /// Declare a predicate method against the bound instance.
    pub fn predicate<M, Args>(&mut self, name: &str, method: M, limit: Concurrency) -> InputFamily
    where
        M: BoundPredicateFn<T, Args>,
    {
        let proxy = self.unbound();
        let arity = method.arity();
        let instance = Arc::clone(&self.instance);
        let func: ErasedPredicate = Box::new(move |inputs| method.invoke(&instance, inputs));
        proxy.declare(
            proxy.full_name(name),
            limit,
            arity,
            OutputsRule::AtMostOne,
            Box::new(move |common| Arc::new(DeclaredPredicate::new(common, func))),
        )
    }

    /// Declare an observer method against the bound instance.
    pub fn observe<M, Args>(&mut self, name: &str, method: M, limit: Concurrency) -> InputFamily
    where
        M: BoundObserverFn<T, Args>,
    {
        let proxy = self.unbound();
        let arity = method.arity();
        let instance = Arc::clone(&self.instance);
        let func: ErasedObserver = Box::new(move |inputs| method.invoke(&instance, inputs));
        proxy.declare(
            proxy.full_name(name),
            limit,
            arity,
            OutputsRule::Exactly(0),
            Box::new(move |common| Arc::new(DeclaredObserver::new(common, func))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::nodes::NodeKind;
    use crate::graph::PipelineGraph;

    fn catalog_names(graph: &PipelineGraph) -> Vec<String> {
        graph
            .catalog()
            .lock()
            .nodes()
            .map(|n| n.full_name().to_string())
            .collect()
    }

    #[test]
    fn test_transform_declaration_registers_on_statement_end() {
        let graph = PipelineGraph::new(Configuration::with_plugin("demo"));
        let mut g = graph.proxy();
        g.transform("double", |x: &i32| (2 * x,), Concurrency::Unlimited)
            .input_family(["x"])
            .output_products(["y"]);

        assert_eq!(catalog_names(&graph), vec!["demo:double"]);
        let catalog = graph.catalog();
        let catalog = catalog.lock();
        let node = catalog.get("demo:double").unwrap();
        assert_eq!(node.kind(), NodeKind::Transform);
        assert_eq!(node.outputs(), ["y".to_string()]);
        assert!(catalog.errors().is_empty());
    }

    #[test]
    fn test_when_between_inputs_and_outputs_is_observed() {
        let graph = PipelineGraph::new(Configuration::with_plugin("demo"));
        let mut g = graph.proxy();
        g.predicate("is_positive", |x: &i32| *x > 0, Concurrency::Serial)
            .input_family(["x"])
            .output_products(["pos"]);
        g.transform("neg", |x: &i32| (-x,), Concurrency::Serial)
            .input_family(["x"])
            .when(["pos"])
            .output_products(["z"]);

        let catalog = graph.catalog();
        let catalog = catalog.lock();
        assert_eq!(catalog.get("demo:neg").unwrap().when(), ["pos".to_string()]);
    }

    #[test]
    fn test_observer_registers_without_output_products() {
        let graph = PipelineGraph::new(Configuration::with_plugin("demo"));
        let mut g = graph.proxy();
        g.observe("tally", |_y: &i32| (), Concurrency::Serial)
            .input_family(["y"]);

        let catalog = graph.catalog();
        let catalog = catalog.lock();
        assert_eq!(catalog.get("demo:tally").unwrap().kind(), NodeKind::Observer);
        assert!(catalog.errors().is_empty());
    }

    #[test]
    fn test_arity_mismatch_is_recorded_not_registered() {
        let graph = PipelineGraph::new(Configuration::with_plugin("demo"));
        let mut g = graph.proxy();
        g.transform("double", |x: &i32| (2 * x,), Concurrency::Serial)
            .input_family(["x", "extra"])
            .output_products(["y"]);

        let catalog = graph.catalog();
        let catalog = catalog.lock();
        assert!(catalog.is_empty());
        assert_eq!(catalog.errors().len(), 1);
        assert!(catalog.errors()[0].contains("1 input(s) expected"));
    }

    #[test]
    fn test_bound_proxy_dispatches_member_functions() {
        struct Scaler {
            factor: i32,
        }
        impl Scaler {
            fn scale(&self, x: &i32) -> (i32,) {
                (self.factor * x,)
            }
        }

        let graph = PipelineGraph::new(Configuration::with_plugin("demo"));
        let mut g = graph.proxy();
        let mut bound = g.make(Scaler { factor: 3 });
        bound
            .transform("scale", Scaler::scale, Concurrency::Serial)
            .input_family(["x"])
            .output_products(["scaled"]);

        assert_eq!(catalog_names(&graph), vec!["demo:scale"]);
    }

    #[test]
    fn test_output_declaration_with_when() {
        let graph = PipelineGraph::new(Configuration::with_plugin("demo"));
        let mut g = graph.proxy();
        g.output("writer", |_store: &ProductStore| (), Concurrency::Serial)
            .when(["pos"]);

        let catalog = graph.catalog();
        let catalog = catalog.lock();
        let node = catalog.get("demo:writer").unwrap();
        assert_eq!(node.kind(), NodeKind::Output);
        assert_eq!(node.when(), ["pos".to_string()]);
    }
}

//! Module registration entry points.
//!
//! A compiled plugin exposes a creation function that registers its nodes
//! into the graph; sources expose a factory bound to a configuration.
//! Dynamic loading itself is out of scope — hosts resolve these entry
//! points however they load code and hand them to the framework.

use crate::config::Configuration;
use crate::core::Result;
use crate::graph::GraphProxy;

/// A registerable bundle of algorithms.
pub trait Module {
    /// Register this module's nodes into the graph.
    fn create(&self, proxy: &mut GraphProxy, config: &Configuration) -> Result<()>;
}

/// The free-function shape of a module entry point.
pub type ModuleCreator = fn(&mut GraphProxy, &Configuration) -> Result<()>;

impl<F> Module for F
where
    F: Fn(&mut GraphProxy, &Configuration) -> Result<()>,
{
    fn create(&self, proxy: &mut GraphProxy, config: &Configuration) -> Result<()> {
        self(proxy, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Concurrency, PipelineGraph};

    #[test]
    fn test_function_modules_register_nodes() {
        fn create(proxy: &mut GraphProxy, _config: &Configuration) -> Result<()> {
            proxy
                .transform("double", |x: &i32| (2 * x,), Concurrency::Unlimited)
                .input_family(["x"])
                .output_products(["y"]);
            Ok(())
        }

        let graph = PipelineGraph::new(Configuration::with_plugin("demo"));
        let module: ModuleCreator = create;
        let mut proxy = graph.proxy();
        module.create(&mut proxy, graph.config()).unwrap();

        assert!(graph.errors().is_empty());
        let catalog = graph.catalog();
        assert_eq!(catalog.lock().len(), 1);
    }
}

//! Deferred node construction.
//!
//! Every declaration statement ends with a live [`Registrar`]. The registrar
//! holds the not-yet-invoked node creator and the fluent options gathered so
//! far; it fires the creator either eagerly from `output_products` or, if
//! the statement ends first, from its `Drop` impl. Either way each statement
//! installs its node exactly once, with every chained option applied.
//!
//! Registrars move but never copy, so exactly one finalization is
//! responsible per statement.

use std::sync::Arc;

use parking_lot::Mutex;

use super::catalog::NodeCatalog;
use super::nodes::FlowNode;

/// How many output products a declaration may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputsRule {
    /// Exactly this many names are required.
    Exactly(usize),
    /// Zero or one name (predicates: the gate alias).
    AtMostOne,
    /// Output products are not part of this declaration (outputs).
    NotAccepted,
}

type NodeCreator = Box<dyn FnOnce(Vec<String>, Vec<String>) -> Arc<dyn FlowNode> + Send>;

/// Completes a registration statement when it goes out of scope.
pub struct Registrar {
    catalog: Arc<Mutex<NodeCatalog>>,
    display_name: String,
    creator: Option<NodeCreator>,
    predicates: Option<Vec<String>>,
    outputs_rule: OutputsRule,
}

impl Registrar {
    pub(crate) fn new(
        catalog: Arc<Mutex<NodeCatalog>>,
        display_name: String,
        outputs_rule: OutputsRule,
    ) -> Self {
        Self {
            catalog,
            display_name,
            creator: None,
            predicates: None,
            outputs_rule,
        }
    }

    pub(crate) fn set_creator(&mut self, creator: NodeCreator) {
        self.creator = Some(creator);
    }

    pub(crate) fn set_predicates(&mut self, predicates: Vec<String>) {
        self.predicates = Some(predicates);
    }

    pub(crate) fn record_error(&self, message: String) {
        self.catalog.lock().record_error(message);
    }

    /// Fire eagerly with explicit output product names; clears the creator
    /// so the eventual drop is a no-op.
    pub(crate) fn fire_with_outputs(&mut self, outputs: Vec<String>) {
        match self.outputs_rule {
            OutputsRule::Exactly(expected) if outputs.len() != expected => {
                self.creator = None;
                self.record_error(format!(
                    "node '{}': {expected} output product(s) required, {} specified",
                    self.display_name,
                    outputs.len()
                ));
            },
            OutputsRule::AtMostOne if outputs.len() > 1 => {
                self.creator = None;
                self.record_error(format!(
                    "node '{}': at most one output product allowed, {} specified",
                    self.display_name,
                    outputs.len()
                ));
            },
            OutputsRule::NotAccepted if !outputs.is_empty() => {
                self.creator = None;
                self.record_error(format!(
                    "node '{}': output products are not accepted here",
                    self.display_name
                ));
            },
            _ => self.fire(outputs),
        }
    }

    fn fire(&mut self, outputs: Vec<String>) {
        if let Some(creator) = self.creator.take() {
            let predicates = self.predicates.take().unwrap_or_default();
            let node = creator(predicates, outputs);
            self.catalog.lock().try_insert(node);
        }
    }
}

impl Drop for Registrar {
    fn drop(&mut self) {
        if self.creator.is_none() {
            return;
        }
        match self.outputs_rule {
            OutputsRule::Exactly(expected) if expected > 0 => {
                self.creator = None;
                self.record_error(format!(
                    "node '{}': declaration ended without naming its {expected} output product(s)",
                    self.display_name
                ));
            },
            _ => self.fire(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::model::{ProductStore, SpecifiedLabel};
    use crate::runtime::context::ExecutionContext;
    use crate::runtime::permits::Concurrency;

    struct StubNode {
        name: String,
        when: Vec<String>,
        outputs: Vec<String>,
    }

    #[async_trait]
    impl FlowNode for StubNode {
        fn full_name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> super::super::nodes::NodeKind {
            super::super::nodes::NodeKind::Observer
        }
        fn input_labels(&self) -> &[SpecifiedLabel] {
            &[]
        }
        fn when(&self) -> &[String] {
            &self.when
        }
        fn outputs(&self) -> &[String] {
            &self.outputs
        }
        fn concurrency(&self) -> Concurrency {
            Concurrency::Serial
        }
        async fn accept(
            &self,
            _store: Arc<ProductStore>,
            _ctx: Arc<ExecutionContext>,
        ) -> Vec<Arc<ProductStore>> {
            Vec::new()
        }
    }

    fn registrar_with_creator(
        catalog: &Arc<Mutex<NodeCatalog>>,
        name: &str,
        rule: OutputsRule,
    ) -> Registrar {
        let mut registrar = Registrar::new(Arc::clone(catalog), name.to_string(), rule);
        let name = name.to_string();
        registrar.set_creator(Box::new(move |when, outputs| {
            Arc::new(StubNode {
                name,
                when,
                outputs,
            })
        }));
        registrar
    }

    #[test]
    fn test_drop_fires_creator_with_stored_predicates() {
        let catalog = Arc::new(Mutex::new(NodeCatalog::new()));
        {
            let mut registrar =
                registrar_with_creator(&catalog, "p:observe", OutputsRule::Exactly(0));
            registrar.set_predicates(vec!["pos".to_string()]);
        }
        let catalog = catalog.lock();
        let node = catalog.get("p:observe").unwrap();
        assert_eq!(node.when(), ["pos".to_string()]);
        assert!(catalog.errors().is_empty());
    }

    #[test]
    fn test_output_products_fires_eagerly_and_drop_is_noop() {
        let catalog = Arc::new(Mutex::new(NodeCatalog::new()));
        {
            let mut registrar =
                registrar_with_creator(&catalog, "p:double", OutputsRule::Exactly(1));
            registrar.fire_with_outputs(vec!["y".to_string()]);
        }
        let catalog = catalog.lock();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("p:double").unwrap().outputs(), ["y".to_string()]);
        assert!(catalog.errors().is_empty());
    }

    #[test]
    fn test_missing_output_products_is_recorded() {
        let catalog = Arc::new(Mutex::new(NodeCatalog::new()));
        {
            let _registrar =
                registrar_with_creator(&catalog, "p:double", OutputsRule::Exactly(1));
        }
        let catalog = catalog.lock();
        assert!(catalog.is_empty());
        assert_eq!(catalog.errors().len(), 1);
        assert!(catalog.errors()[0].contains("without naming"));
    }

    #[test]
    fn test_wrong_output_count_is_recorded() {
        let catalog = Arc::new(Mutex::new(NodeCatalog::new()));
        {
            let mut registrar =
                registrar_with_creator(&catalog, "p:double", OutputsRule::Exactly(1));
            registrar.fire_with_outputs(vec!["y".to_string(), "z".to_string()]);
        }
        let catalog = catalog.lock();
        assert!(catalog.is_empty());
        assert_eq!(catalog.errors().len(), 1);
    }

    #[test]
    fn test_duplicate_statements_register_once_with_error() {
        let catalog = Arc::new(Mutex::new(NodeCatalog::new()));
        for _ in 0..2 {
            let _registrar =
                registrar_with_creator(&catalog, "p:observe", OutputsRule::Exactly(0));
        }
        let catalog = catalog.lock();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.errors().len(), 1);
    }
}

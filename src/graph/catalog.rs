//! The node catalog: registration-ordered node storage plus the shared
//! error vector.

use std::sync::Arc;

use indexmap::IndexMap;

use super::nodes::{FlowNode, NodeKind};

/// Registered nodes keyed by full name, preserving registration order, with
/// the error vector composition problems accumulate into.
#[derive(Default)]
pub struct NodeCatalog {
    nodes: IndexMap<String, Arc<dyn FlowNode>>,
    errors: Vec<String>,
}

impl NodeCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node; a duplicate full name keeps the first entry and
    /// records an error.
    pub fn try_insert(&mut self, node: Arc<dyn FlowNode>) {
        let name = node.full_name().to_string();
        if self.nodes.contains_key(&name) {
            self.errors
                .push(format!("duplicate registration of node '{name}'"));
            return;
        }
        tracing::debug!(node = %name, kind = %node.kind(), "node registered");
        self.nodes.insert(name, node);
    }

    /// Record a composition error.
    pub fn record_error(&mut self, message: String) {
        self.errors.push(message);
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<dyn FlowNode>> {
        self.nodes.values()
    }

    /// Look up a node by full name.
    pub fn get(&self, full_name: &str) -> Option<&Arc<dyn FlowNode>> {
        self.nodes.get(full_name)
    }

    /// Nodes of one kind, in registration order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<Arc<dyn FlowNode>> {
        self.nodes
            .values()
            .filter(|n| n.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Accumulated errors.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::model::{ProductStore, SpecifiedLabel};
    use crate::runtime::context::ExecutionContext;
    use crate::runtime::permits::Concurrency;

    struct StubNode {
        name: String,
        kind: NodeKind,
    }

    #[async_trait]
    impl FlowNode for StubNode {
        fn full_name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> NodeKind {
            self.kind
        }
        fn input_labels(&self) -> &[SpecifiedLabel] {
            &[]
        }
        fn when(&self) -> &[String] {
            &[]
        }
        fn outputs(&self) -> &[String] {
            &[]
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

    fn stub(name: &str, kind: NodeKind) -> Arc<dyn FlowNode> {
        Arc::new(StubNode {
            name: name.to_string(),
            kind,
        })
    }

    #[test]
    fn test_duplicate_keeps_first_and_records_error() {
        let mut catalog = NodeCatalog::new();
        catalog.try_insert(stub("p:a", NodeKind::Transform));
        catalog.try_insert(stub("p:a", NodeKind::Observer));

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("p:a").unwrap().kind(), NodeKind::Transform);
        assert_eq!(catalog.errors().len(), 1);
        assert!(catalog.errors()[0].contains("duplicate"));
    }

    #[test]
    fn test_registration_order_preserved() {
        let mut catalog = NodeCatalog::new();
        catalog.try_insert(stub("p:c", NodeKind::Transform));
        catalog.try_insert(stub("p:a", NodeKind::Predicate));
        catalog.try_insert(stub("p:b", NodeKind::Transform));

        let names: Vec<_> = catalog.nodes().map(|n| n.full_name().to_string()).collect();
        assert_eq!(names, vec!["p:c", "p:a", "p:b"]);
        assert_eq!(catalog.nodes_of_kind(NodeKind::Transform).len(), 2);
    }
}

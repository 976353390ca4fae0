//! Composition-time validation and graph assembly.
//!
//! After registration the catalog is checked as a whole: qualified input
//! labels must name a registered producer, `when` names must resolve to a
//! unique predicate, output product names must be disjoint across nodes,
//! and the producer/consumer dependency graph must be acyclic. All problems
//! accumulate; execution is refused while any are present.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use sha2::{Digest, Sha256};

use super::catalog::NodeCatalog;
use super::nodes::{DeclaredPredicate, FlowNode};
use crate::model::{to_qualified_names, AlgorithmName, QualifiedName};

/// A validated graph, ready for execution.
pub struct ComposedGraph {
    // Debug is implemented manually below: `FlowNode` trait objects don't
    // derive it.
    /// Nodes in registration order.
    pub nodes: Vec<Arc<dyn FlowNode>>,
    /// Gate index: alias to predicate, unambiguous aliases only.
    pub gates: HashMap<String, Arc<DeclaredPredicate>>,
    /// Every declared output, fully qualified by its producer.
    pub products: Vec<QualifiedName>,
    /// Input product names no registered node produces; expected from the
    /// source.
    pub source_products: Vec<String>,
    /// SHA-256 digest of the canonical composition.
    pub digest: String,
}

impl std::fmt::Debug for ComposedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedGraph")
            .field(
                "nodes",
                &self.nodes.iter().map(|n| n.full_name()).collect::<Vec<_>>(),
            )
            .field("gates", &self.gates.keys().collect::<Vec<_>>())
            .field("products", &self.products)
            .field("source_products", &self.source_products)
            .field("digest", &self.digest)
            .finish()
    }
}

/// Validate the catalog and assemble the composed graph.
///
/// Returns every accumulated problem — the catalog's own registration
/// errors plus composition checks — rather than stopping at the first.
pub fn compose(catalog: &NodeCatalog) -> Result<ComposedGraph, Vec<String>> {
    let mut errors: Vec<String> = catalog.errors().to_vec();
    let nodes: Vec<Arc<dyn FlowNode>> = catalog.nodes().cloned().collect();

    // Output product names must be disjoint across nodes.
    let mut producers: HashMap<&str, usize> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        for output in node.outputs() {
            if let Some(previous) = producers.insert(output.as_str(), index) {
                errors.push(format!(
                    "product '{}' produced by both '{}' and '{}'",
                    output,
                    nodes[previous].full_name(),
                    node.full_name()
                ));
            }
        }
    }

    // Gate index: predicate aliases, with ambiguous ones tracked.
    let mut gates: HashMap<String, Arc<DeclaredPredicate>> = HashMap::new();
    let mut gate_owner: HashMap<String, usize> = HashMap::new();
    let mut ambiguous: HashSet<String> = HashSet::new();
    for (index, node) in nodes.iter().enumerate() {
        let Some(predicate) = Arc::clone(node).as_predicate() else {
            continue;
        };
        for alias in predicate.gate_aliases() {
            match gate_owner.get(&alias) {
                Some(&owner) if owner == index => {},
                Some(_) => {
                    ambiguous.insert(alias.clone());
                    gates.remove(&alias);
                },
                None => {
                    gate_owner.insert(alias.clone(), index);
                    gates.insert(alias, Arc::clone(&predicate));
                },
            }
        }
    }

    // Dependency edges: producer -> consumer for labels, predicate ->
    // consumer for gates.
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
    let mut source_products: Vec<String> = Vec::new();

    for (index, node) in nodes.iter().enumerate() {
        for label in node.input_labels() {
            match producers.get(label.name()) {
                Some(&producer) => {
                    let producer_name = AlgorithmName::parse(nodes[producer].full_name());
                    if !label.accepts_producer(&producer_name) {
                        errors.push(format!(
                            "node '{}': no producer matches label '{}'",
                            node.full_name(),
                            label
                        ));
                        continue;
                    }
                    if producer != index {
                        graph.add_edge(indices[producer], indices[index], ());
                    }
                },
                None => {
                    if label.qualifier().is_some() {
                        errors.push(format!(
                            "node '{}': missing producer for input label '{}'",
                            node.full_name(),
                            label
                        ));
                    } else if !source_products.contains(&label.name().to_string()) {
                        // Unqualified and unproduced: expected from the
                        // framework source.
                        source_products.push(label.name().to_string());
                    }
                },
            }
        }

        for gate in node.when() {
            if ambiguous.contains(gate) {
                errors.push(format!(
                    "node '{}': gating predicate '{}' is ambiguous",
                    node.full_name(),
                    gate
                ));
                continue;
            }
            match gate_owner.get(gate) {
                Some(&owner) => {
                    if owner != index {
                        graph.add_edge(indices[owner], indices[index], ());
                    }
                },
                None => errors.push(format!(
                    "node '{}': unknown predicate '{}' in when clause",
                    node.full_name(),
                    gate
                )),
            }
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        let name = nodes[graph[cycle.node_id()]].full_name();
        errors.push(format!("dependency cycle involving node '{name}'"));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let products = nodes
        .iter()
        .flat_map(|node| {
            to_qualified_names(&AlgorithmName::parse(node.full_name()), node.outputs())
        })
        .collect();
    let digest = composition_digest(&nodes);
    tracing::info!(
        nodes = nodes.len(),
        source_products = source_products.len(),
        digest = %digest,
        "graph composed"
    );
    Ok(ComposedGraph {
        nodes,
        gates,
        products,
        source_products,
        digest,
    })
}

/// Canonical SHA-256 digest of the composition, for the run summary.
fn composition_digest(nodes: &[Arc<dyn FlowNode>]) -> String {
    let mut hasher = Sha256::new();
    for node in nodes {
        hasher.update(node.full_name().as_bytes());
        hasher.update([0x1f]);
        hasher.update(node.kind().to_string().as_bytes());
        for label in node.input_labels() {
            hasher.update([0x1e]);
            hasher.update(label.to_string().as_bytes());
        }
        for gate in node.when() {
            hasher.update([0x1d]);
            hasher.update(gate.as_bytes());
        }
        for output in node.outputs() {
            hasher.update([0x1c]);
            hasher.update(output.as_bytes());
        }
        hasher.update([0x0a]);
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

//! The finished action graph.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::GraphError;
use crate::product::{BuildStatement, Product};
use crate::target::TargetId;
use crate::util::hash::ObjectHash;

/// The products of one target materialized in one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEntry {
  pub target: TargetId,
  /// Digest of the environment the target's build function saw.
  pub env: ObjectHash,
  pub products: Vec<Product>,
}

/// Every product of a materialization, grouped by target.
///
/// Entries are ordered dependencies-first, starting from the roots in the
/// order they were declared. Each output path is written by exactly one
/// product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionGraph {
  entries: Vec<GraphEntry>,
}

impl ActionGraph {
  pub(crate) fn new(entries: Vec<GraphEntry>) -> Self {
    Self { entries }
  }

  pub fn entries(&self) -> &[GraphEntry] {
    &self.entries
  }

  /// All products, in entry order.
  pub fn products(&self) -> impl Iterator<Item = &Product> {
    self.entries.iter().flat_map(|entry| entry.products.iter())
  }

  /// Products emitted by `target`, across every environment it was
  /// materialized in.
  pub fn products_of<'a>(&'a self, target: &'a TargetId) -> impl Iterator<Item = &'a Product> {
    self
      .entries
      .iter()
      .filter(move |entry| &entry.target == target)
      .flat_map(|entry| entry.products.iter())
  }

  /// The product writing `path`, as an output or a symlink.
  pub fn find_output(&self, path: &str) -> Option<&Product> {
    self.products().find(|product| product.written_paths().any(|p| p == path))
  }

  /// Number of products.
  pub fn len(&self) -> usize {
    self.entries.iter().map(|entry| entry.products.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Emitter-facing statements for every product, in product order.
  pub fn statements(&self) -> Result<Vec<BuildStatement>, GraphError> {
    let mut statements = Vec::with_capacity(self.len());
    for product in self.products() {
      statements.extend(product.statements()?);
    }
    Ok(statements)
  }

  /// Groups products into levels that can run concurrently.
  ///
  /// A product depends on another when it reads (as an input, implicit or
  /// order-only path) something the other writes. Every product only
  /// depends on products in earlier waves. Within a wave, products keep
  /// their graph order.
  pub fn waves(&self) -> Result<Vec<Vec<&Product>>, GraphError> {
    let products: Vec<&Product> = self.products().collect();
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..products.len()).map(|i| graph.add_node(i)).collect();

    let mut writers: HashMap<&str, usize> = HashMap::new();
    for (i, product) in products.iter().enumerate() {
      for path in product.written_paths() {
        writers.insert(path, i);
      }
    }

    for (i, product) in products.iter().enumerate() {
      let mut upstream = HashSet::new();
      for path in product.read_paths() {
        if let Some(&writer) = writers.get(path.as_str())
          && writer != i
          && upstream.insert(writer)
        {
          graph.add_edge(nodes[writer], nodes[i], ());
        }
      }
    }

    let cycle = |graph: &DiGraph<usize, ()>, node: NodeIndex| {
      let product = products[graph[node]];
      GraphError::DependencyCycle(product.outputs().to_vec())
    };
    toposort(&graph, None).map_err(|c| cycle(&graph, c.node_id()))?;

    // Kahn's algorithm, one level at a time
    let mut in_degree: Vec<usize> = nodes
      .iter()
      .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
      .collect();
    let mut done = vec![false; nodes.len()];
    let mut waves = Vec::new();

    while done.iter().any(|d| !d) {
      let ready: Vec<usize> = (0..nodes.len()).filter(|&i| !done[i] && in_degree[i] == 0).collect();
      if ready.is_empty() {
        return Err(GraphError::DependencyCycle(Vec::new()));
      }

      for &i in &ready {
        done[i] = true;
        for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
          in_degree[graph[next]] = in_degree[graph[next]].saturating_sub(1);
        }
      }
      waves.push(ready.into_iter().map(|i| products[i]).collect());
    }

    Ok(waves)
  }
}

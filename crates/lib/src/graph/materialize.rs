use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use rayon::prelude::*;
use tracing::{debug, info, trace};

use super::{ActionGraph, GraphEntry, GraphError};
use crate::env::{Delta, Environment};
use crate::product::Product;
use crate::project::{Project, TargetNode};
use crate::target::{BuildError, DownEnv, Materialized, TargetId};
use crate::util::hash::ObjectHash;

/// A target is materialized once per distinct environment handed to its
/// dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EvalKey {
  target: usize,
  env: ObjectHash,
}

struct Evaluation {
  key: EvalKey,
  id: TargetId,
  env: Environment,
  deps: Vec<Arc<Evaluation>>,
  /// Dependency evaluations whose using-deltas this one passes on, in the
  /// order they are applied. Empty for opaque targets.
  forwarded: Vec<Arc<Evaluation>>,
  using: Vec<Delta>,
  products: Vec<Product>,
}

impl Evaluation {
  /// What a dependent applies on top of its own environment: forwarded
  /// evaluations first, then this one.
  fn exports(self: &Arc<Self>) -> impl Iterator<Item = Arc<Evaluation>> + '_ {
    self.forwarded.iter().cloned().chain(std::iter::once(self.clone()))
  }
}

type Slot = Arc<OnceLock<Result<Arc<Evaluation>, GraphError>>>;

/// One materialization pass over a project.
///
/// The memo holds a write-once slot per [`EvalKey`]. The first caller to
/// reach a slot computes it; concurrent callers block on the slot and
/// share the result, including a failure.
pub(crate) struct Materializer<'p> {
  project: &'p Project,
  deps: &'p [Vec<usize>],
  memo: Mutex<HashMap<EvalKey, Slot>>,
  builds: AtomicUsize,
}

impl<'p> Materializer<'p> {
  /// `deps` must be the project's resolved, acyclic dependency lists.
  pub(crate) fn new(project: &'p Project, deps: &'p [Vec<usize>]) -> Self {
    Self {
      project,
      deps,
      memo: Mutex::new(HashMap::new()),
      builds: AtomicUsize::new(0),
    }
  }

  pub(crate) fn run(&self, roots: &[usize], env: Option<&Environment>) -> Result<ActionGraph, GraphError> {
    info!(roots = roots.len(), "materializing target graph");
    let evaluations = roots
      .iter()
      .map(|&root| self.evaluate(root, env))
      .collect::<Result<Vec<_>, _>>()?;
    self.finish(&evaluations)
  }

  pub(crate) fn run_parallel(&self, roots: &[usize], env: Option<&Environment>) -> Result<ActionGraph, GraphError> {
    info!(roots = roots.len(), "materializing target graph in parallel");
    let results: Vec<_> = roots.par_iter().map(|&root| self.evaluate(root, env)).collect();
    // Report the first failing root in declaration order, as `run` would.
    let evaluations = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    self.finish(&evaluations)
  }

  fn node(&self, idx: usize) -> &'p TargetNode {
    &self.project.nodes()[idx]
  }

  fn down_env(&self, node: &TargetNode, env_up: Option<&Environment>) -> Result<Environment, GraphError> {
    match node.target.down() {
      DownEnv::Inherit => env_up
        .cloned()
        .ok_or_else(|| GraphError::NoInboundEnvironment(node.id.clone())),
      DownEnv::Named { env, extra } => self
        .project
        .named_env(env)?
        .derive(extra)
        .map_err(|e| GraphError::Target {
          target: node.id.clone(),
          error: e.into(),
        }),
    }
  }

  fn evaluate(&self, idx: usize, env_up: Option<&Environment>) -> Result<Arc<Evaluation>, GraphError> {
    let node = self.node(idx);
    let env_down = self.down_env(node, env_up)?;
    let key = EvalKey {
      target: idx,
      env: env_down.digest().clone(),
    };

    let slot = {
      let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
      memo.entry(key.clone()).or_default().clone()
    };

    if let Some(done) = slot.get() {
      trace!(id = %node.id, env = %key.env, "memo hit");
      return done.clone();
    }
    slot.get_or_init(|| self.build(node, key, env_down)).clone()
  }

  fn build(&self, node: &TargetNode, key: EvalKey, env_down: Environment) -> Result<Arc<Evaluation>, GraphError> {
    let in_target = |error: BuildError| GraphError::Target {
      target: node.id.clone(),
      error,
    };

    let env_local = env_down.derive(node.target.local()).map_err(|e| in_target(e.into()))?;

    let deps = self.deps[key.target]
      .iter()
      .map(|&dep| self.evaluate(dep, Some(&env_down)))
      .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    let mut forwarded = Vec::new();
    for export in deps.iter().flat_map(|dep| dep.exports()) {
      if seen.insert(export.key.clone()) {
        forwarded.push(export);
      }
    }

    let env = env_local
      .derive_all(forwarded.iter().flat_map(|e| e.using.iter()))
      .map_err(|e| in_target(e.into()))?;

    let Materialized { using, products } = node
      .target
      .builder()
      .materialize(&node.package, &env)
      .map_err(in_target)?;

    self.builds.fetch_add(1, Ordering::Relaxed);
    debug!(
      id = %node.id,
      env = %env.digest(),
      deps = deps.len(),
      products = products.len(),
      "target materialized"
    );

    if !node.target.is_transparent() {
      forwarded.clear();
    }

    Ok(Arc::new(Evaluation {
      key,
      id: node.id.clone(),
      env,
      deps,
      forwarded,
      using,
      products,
    }))
  }

  /// Orders evaluations dependencies-first from the roots, then checks that
  /// no two different products write the same path.
  fn finish(&self, roots: &[Arc<Evaluation>]) -> Result<ActionGraph, GraphError> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    for root in roots {
      post_order(root, &mut visited, &mut order);
    }

    let mut owners: HashMap<String, (usize, usize)> = HashMap::new();
    let mut entries: Vec<GraphEntry> = Vec::with_capacity(order.len());

    for evaluation in &order {
      let mut products = Vec::new();

      for product in &evaluation.products {
        if let Some(symlink) = product.symlink_as()
          && product.outputs().len() != 1
        {
          return Err(GraphError::AmbiguousSymlink {
            symlink: symlink.to_string(),
            outputs: product.outputs().to_vec(),
          });
        }

        let mut duplicate = false;
        for path in product.written_paths() {
          let Some(&(entry, index)) = owners.get(path) else {
            continue;
          };
          let existing = match entries.get(entry) {
            Some(owner) => (&owner.target, &owner.products[index]),
            None => (&evaluation.id, &products[index]),
          };
          if existing.1 == product {
            duplicate = true;
          } else {
            return Err(GraphError::OutputCollision {
              output: path.to_string(),
              first: existing.0.clone(),
              first_rule: existing.1.rule().to_string(),
              second: evaluation.id.clone(),
              second_rule: product.rule().to_string(),
            });
          }
        }

        if duplicate {
          trace!(rule = product.rule(), "duplicate product skipped");
          continue;
        }

        for path in product.written_paths() {
          owners.insert(path.to_string(), (entries.len(), products.len()));
        }
        products.push(product.clone());
      }

      entries.push(GraphEntry {
        target: evaluation.id.clone(),
        env: evaluation.env.digest().clone(),
        products,
      });
    }

    let graph = ActionGraph::new(entries);
    info!(
      targets = graph.entries().len(),
      builds = self.builds.load(Ordering::Relaxed),
      products = graph.len(),
      "target graph materialized"
    );
    Ok(graph)
  }
}

fn post_order(evaluation: &Arc<Evaluation>, visited: &mut HashSet<EvalKey>, order: &mut Vec<Arc<Evaluation>>) {
  if !visited.insert(evaluation.key.clone()) {
    return;
  }
  for dep in &evaluation.deps {
    post_order(dep, visited, order);
  }
  order.push(evaluation.clone());
}

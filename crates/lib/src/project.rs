//! Projects, packages and the filesystem layout of build outputs.
//!
//! Outputs live under `<build_dir>/env/<digest>/<package>/...`, where
//! `<digest>` is the digest of the environment the output was built in.
//! Stable aliases live under `<build_dir>/latest/<package>/...`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use crate::config::ProjectConfig;
use crate::consts::{ENV_DIR, LATEST_DIR};
use crate::env::{Delta, Environment, KeyRegistry};
use crate::fingerprint::{ContentDigest, PathOnly, SourceFingerprint};
use crate::graph::{ActionGraph, GraphError, Materializer};
use crate::plugin::Plugin;
use crate::rules::RuleCatalog;
use crate::target::{Target, TargetId};

/// Source root, build directory and source fingerprinting policy.
pub struct Layout {
  root: PathBuf,
  build_dir: PathBuf,
  fingerprint: Arc<dyn SourceFingerprint>,
}

impl Layout {
  pub fn new(root: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      build_dir: build_dir.into(),
      fingerprint: Arc::new(PathOnly),
    }
  }

  pub fn with_fingerprint(mut self, fingerprint: impl SourceFingerprint + 'static) -> Self {
    self.fingerprint = Arc::new(fingerprint);
    self
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn build_dir(&self) -> &Path {
    &self.build_dir
  }

  pub fn fingerprint(&self) -> &dyn SourceFingerprint {
    self.fingerprint.as_ref()
  }

  /// Path to a source file in the project tree.
  pub fn inpath(&self, parts: &[&str]) -> String {
    join(&self.root, parts)
  }

  /// Path to an output built in `env`.
  pub fn outpath(&self, env: &Environment, parts: &[&str]) -> String {
    join(&self.build_dir.join(ENV_DIR).join(&env.digest().0), parts)
  }

  /// Path to a stable alias in the `latest` tree.
  pub fn linkpath(&self, parts: &[&str]) -> String {
    join(&self.build_dir.join(LATEST_DIR), parts)
  }
}

impl std::fmt::Debug for Layout {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Layout")
      .field("root", &self.root)
      .field("build_dir", &self.build_dir)
      .finish_non_exhaustive()
  }
}

fn join(base: &Path, parts: &[&str]) -> String {
  let mut path = base.to_path_buf();
  for part in parts.iter().filter(|p| !p.is_empty()) {
    path.push(part);
  }
  path.to_string_lossy().into_owned()
}

/// A directory of the project tree holding target declarations.
#[derive(Debug)]
pub struct Package {
  relpath: String,
  layout: Arc<Layout>,
}

impl Package {
  pub fn relpath(&self) -> &str {
    &self.relpath
  }

  pub fn layout(&self) -> &Layout {
    &self.layout
  }

  pub fn inpath(&self, part: &str) -> String {
    self.layout.inpath(&[&self.relpath, part])
  }

  pub fn outpath(&self, env: &Environment, part: &str) -> String {
    self.layout.outpath(env, &[&self.relpath, part])
  }

  pub fn linkpath(&self, part: &str) -> String {
    self.layout.linkpath(&[&self.relpath, part])
  }

  /// Resolves a dependency label declared in this package.
  pub fn make_absolute(&self, label: &str) -> Result<TargetId, GraphError> {
    TargetId::parse(label, &self.relpath).ok_or_else(|| GraphError::InvalidLabel {
      label: label.to_string(),
    })
  }
}

pub(crate) struct TargetNode {
  pub(crate) id: TargetId,
  pub(crate) package: Arc<Package>,
  pub(crate) target: Target,
}

/// All packages, targets and named environments of one build tree.
pub struct Project {
  layout: Arc<Layout>,
  registry: Arc<KeyRegistry>,
  rules: RuleCatalog,
  named_envs: BTreeMap<String, Environment>,
  packages: BTreeMap<String, Arc<Package>>,
  nodes: Vec<TargetNode>,
  index: HashMap<TargetId, usize>,
}

impl Project {
  /// Creates a project, defining the named environments from `config` in
  /// order.
  pub fn new(config: &ProjectConfig, registry: KeyRegistry, rules: RuleCatalog) -> Result<Self, GraphError> {
    let mut layout = Layout::new(config.root.clone(), config.build_dir.clone());
    if config.fingerprint_sources {
      layout = layout.with_fingerprint(ContentDigest);
    }

    let mut project = Self::with_layout(layout, registry, rules);
    for decl in &config.environments {
      let delta = decl.delta()?;
      project.define_environment(&decl.name, decl.base.as_deref(), &delta)?;
    }

    info!(
      keys = project.registry.len(),
      rules = project.rules.len(),
      environments = project.named_envs.len(),
      "project configured"
    );
    Ok(project)
  }

  /// Creates a project whose keys and rules come from `plugins`.
  pub fn with_plugins(config: &ProjectConfig, plugins: &[&dyn Plugin]) -> Result<Self, GraphError> {
    let mut registry = KeyRegistry::new();
    let mut rules = RuleCatalog::new();
    for plugin in plugins {
      debug!(plugin = plugin.name(), "installing plugin");
      plugin.install(&mut registry, &mut rules)?;
    }
    Self::new(config, registry, rules)
  }

  pub fn with_layout(layout: Layout, registry: KeyRegistry, rules: RuleCatalog) -> Self {
    Self {
      layout: Arc::new(layout),
      registry: Arc::new(registry),
      rules,
      named_envs: BTreeMap::new(),
      packages: BTreeMap::new(),
      nodes: Vec::new(),
      index: HashMap::new(),
    }
  }

  pub fn layout(&self) -> &Layout {
    &self.layout
  }

  pub fn registry(&self) -> &Arc<KeyRegistry> {
    &self.registry
  }

  pub fn rules(&self) -> &RuleCatalog {
    &self.rules
  }

  /// An environment with no values over this project's keys.
  pub fn empty_env(&self) -> Result<Environment, GraphError> {
    Ok(Environment::empty(self.registry.clone())?)
  }

  /// Defines `name` as `base` (or the empty environment) derived with `delta`.
  pub fn define_environment(&mut self, name: &str, base: Option<&str>, delta: &Delta) -> Result<&Environment, GraphError> {
    if self.named_envs.contains_key(name) {
      return Err(GraphError::DuplicateEnvironment(name.to_string()));
    }

    let base = match base {
      Some(base) => self.named_env(base)?.clone(),
      None => self.empty_env()?,
    };
    let env = base.derive(delta)?;
    debug!(name, digest = %env.digest(), "environment defined");

    Ok(self.named_envs.entry(name.to_string()).or_insert(env))
  }

  pub fn named_env(&self, name: &str) -> Result<&Environment, GraphError> {
    self
      .named_envs
      .get(name)
      .ok_or_else(|| GraphError::UnknownEnvironment(name.to_string()))
  }

  pub fn add_package(&mut self, relpath: &str) -> Result<Arc<Package>, GraphError> {
    let relpath = normalize(relpath);
    if self.packages.contains_key(&relpath) {
      return Err(GraphError::DuplicatePackage(relpath));
    }
    Ok(self.insert_package(relpath))
  }

  pub fn package(&self, relpath: &str) -> Option<&Arc<Package>> {
    self.packages.get(&normalize(relpath))
  }

  fn insert_package(&mut self, relpath: String) -> Arc<Package> {
    let package = Arc::new(Package {
      relpath: relpath.clone(),
      layout: self.layout.clone(),
    });
    self.packages.insert(relpath, package.clone());
    package
  }

  /// Declares `target` in the package at `relpath`, creating the package on
  /// first use.
  pub fn add_target(&mut self, relpath: &str, target: Target) -> Result<TargetId, GraphError> {
    let relpath = normalize(relpath);
    let package = match self.packages.get(&relpath) {
      Some(package) => package.clone(),
      None => self.insert_package(relpath),
    };

    let id = TargetId::new(package.relpath(), target.name());
    if self.index.contains_key(&id) {
      return Err(GraphError::DuplicateTarget(id));
    }

    self.index.insert(id.clone(), self.nodes.len());
    self.nodes.push(TargetNode {
      id: id.clone(),
      package,
      target,
    });
    Ok(id)
  }

  pub fn target(&self, id: &TargetId) -> Option<&Target> {
    self.index.get(id).map(|&idx| &self.nodes[idx].target)
  }

  /// Target identities in declaration order.
  pub fn targets(&self) -> impl Iterator<Item = &TargetId> {
    self.nodes.iter().map(|node| &node.id)
  }

  pub(crate) fn nodes(&self) -> &[TargetNode] {
    &self.nodes
  }

  /// Resolves every target's dependency labels to arena indices.
  pub(crate) fn resolve(&self) -> Result<Vec<Vec<usize>>, GraphError> {
    self
      .nodes
      .iter()
      .map(|node| {
        node
          .target
          .deps()
          .iter()
          .map(|label| {
            let id = node.package.make_absolute(label)?;
            self.index.get(&id).copied().ok_or_else(|| GraphError::UnknownTarget {
              from: node.id.clone(),
              label: label.clone(),
            })
          })
          .collect::<Result<Vec<_>, _>>()
      })
      .collect()
  }

  /// Fails with `DependencyCycle` naming one cycle if the dependency graph
  /// is not acyclic.
  pub fn check_acyclic(&self) -> Result<(), GraphError> {
    let deps = self.resolve()?;
    check_acyclic(&self.nodes, &deps)
  }

  /// Materializes every concrete target, in declaration order.
  pub fn materialize(&self) -> Result<ActionGraph, GraphError> {
    let roots = self.concrete_roots();
    let deps = self.prepare()?;
    Materializer::new(self, &deps).run(&roots, None)
  }

  /// Like [`Project::materialize`], fanning the roots out over the rayon
  /// thread pool. The result is identical.
  pub fn materialize_parallel(&self) -> Result<ActionGraph, GraphError> {
    let roots = self.concrete_roots();
    let deps = self.prepare()?;
    Materializer::new(self, &deps).run_parallel(&roots, None)
  }

  /// Materializes one target and its dependencies. `env` is what the target
  /// inherits if it does not name its own environment.
  pub fn materialize_target(&self, id: &TargetId, env: Option<&Environment>) -> Result<ActionGraph, GraphError> {
    let root = *self.index.get(id).ok_or_else(|| GraphError::UnknownTarget {
      from: id.clone(),
      label: id.to_string(),
    })?;
    let deps = self.prepare()?;
    Materializer::new(self, &deps).run(&[root], env)
  }

  fn concrete_roots(&self) -> Vec<usize> {
    (0..self.nodes.len())
      .filter(|&idx| self.nodes[idx].target.is_concrete())
      .collect()
  }

  fn prepare(&self) -> Result<Vec<Vec<usize>>, GraphError> {
    let deps = self.resolve()?;
    check_acyclic(&self.nodes, &deps)?;
    Ok(deps)
  }
}

fn normalize(relpath: &str) -> String {
  relpath
    .split('/')
    .filter(|part| !part.is_empty() && *part != ".")
    .collect::<Vec<_>>()
    .join("/")
}

fn check_acyclic(nodes: &[TargetNode], deps: &[Vec<usize>]) -> Result<(), GraphError> {
  let mut graph: DiGraph<usize, ()> = DiGraph::new();
  let indices: Vec<NodeIndex> = (0..nodes.len()).map(|idx| graph.add_node(idx)).collect();
  for (from, targets) in deps.iter().enumerate() {
    for &to in targets {
      graph.add_edge(indices[from], indices[to], ());
    }
  }

  if toposort(&graph, None).is_ok() {
    return Ok(());
  }

  // Walk declared edges inside one strongly connected component until a
  // node repeats; the tail from the first repeat is a concrete cycle.
  let scc = tarjan_scc(&graph)
    .into_iter()
    .find(|scc| scc.len() > 1 || deps[graph[scc[0]]].contains(&graph[scc[0]]))
    .unwrap_or_default();
  let members: Vec<usize> = scc.iter().map(|&n| graph[n]).collect();

  let mut path: Vec<usize> = Vec::new();
  let mut current = members.iter().copied().min();
  while let Some(idx) = current {
    if let Some(start) = path.iter().position(|&seen| seen == idx) {
      let mut cycle: Vec<String> = path[start..].iter().map(|&i| nodes[i].id.to_string()).collect();
      cycle.push(nodes[idx].id.to_string());
      return Err(GraphError::DependencyCycle(cycle));
    }
    path.push(idx);
    current = deps[idx].iter().copied().find(|next| members.contains(next));
  }

  Err(GraphError::DependencyCycle(Vec::new()))
}

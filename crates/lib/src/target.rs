//! Build targets.
//!
//! A [`Target`] is a named build unit declared in a package. Given the
//! environment it is materialized in, its [`BuildTarget`] returns the products
//! it emits and the using-deltas it exposes to targets depending on it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::env::{Delta, EnvError, Environment};
use crate::product::Product;
use crate::project::Package;
use crate::util::hash::FileHashError;

/// Identity of a target: the package it is declared in plus its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId {
  pub package: String,
  pub name: String,
}

impl TargetId {
  pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      package: package.into(),
      name: name.into(),
    }
  }

  /// Parses a dependency label relative to `package`.
  ///
  /// Accepted forms are `//path/to/pkg:name`, `:name` and a bare `name`, the
  /// last two naming a target in the same package.
  pub fn parse(label: &str, package: &str) -> Option<Self> {
    let (pkg, name) = if let Some(rest) = label.strip_prefix("//") {
      let (pkg, name) = rest.split_once(':')?;
      (pkg.trim_matches('/'), name)
    } else if let Some(name) = label.strip_prefix(':') {
      (package, name)
    } else {
      (package, label)
    };

    if name.is_empty() || name.contains([':', '/']) {
      return None;
    }
    Some(Self::new(pkg, name))
  }
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "//{}:{}", self.package, self.name)
  }
}

/// Errors raised by a target's build function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  #[error(transparent)]
  Env(#[from] EnvError),

  #[error("no compile rule for source file '{file}'")]
  UnsupportedSourceType { file: String },

  #[error("source '{file}' must be a relative path inside its package")]
  InvalidSourcePath { file: String },

  #[error("source '{file}' listed more than once")]
  DuplicateSource { file: String },

  #[error("failed to fingerprint source {path}: {message}")]
  Fingerprint { path: String, message: String },
}

impl From<FileHashError> for BuildError {
  fn from(e: FileHashError) -> Self {
    BuildError::Fingerprint {
      path: e.path,
      message: e.message,
    }
  }
}

/// What a target produced in one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialized {
  /// Deltas applied, in order, to the environment of every dependent.
  pub using: Vec<Delta>,
  pub products: Vec<Product>,
}

impl Materialized {
  pub fn new(using: Vec<Delta>, products: Vec<Product>) -> Self {
    Self { using, products }
  }
}

/// The build function of a target.
///
/// Implementations must be pure functions of their arguments: a target is
/// materialized once per environment and the result is shared by every
/// dependent.
pub trait BuildTarget: Send + Sync {
  fn materialize(&self, package: &Package, env: &Environment) -> Result<Materialized, BuildError>;
}

impl<F> BuildTarget for F
where
  F: Fn(&Package, &Environment) -> Result<Materialized, BuildError> + Send + Sync,
{
  fn materialize(&self, package: &Package, env: &Environment) -> Result<Materialized, BuildError> {
    self(package, env)
  }
}

/// Where the environment seen by a target's dependencies comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownEnv {
  /// The environment the dependent passed down.
  Inherit,
  /// A project-level named environment plus an extra delta, regardless of
  /// what the dependent passed down.
  Named { env: String, extra: Delta },
}

/// A target declaration.
#[derive(Clone)]
pub struct Target {
  name: String,
  deps: Vec<String>,
  concrete: bool,
  transparent: bool,
  down: DownEnv,
  local: Delta,
  builder: Arc<dyn BuildTarget>,
}

impl Target {
  pub fn new(name: impl Into<String>, builder: impl BuildTarget + 'static) -> Self {
    Self {
      name: name.into(),
      deps: Vec::new(),
      concrete: false,
      transparent: false,
      down: DownEnv::Inherit,
      local: Delta::new(),
      builder: Arc::new(builder),
    }
  }

  /// Like [`Target::new`], with the closure signature spelled out so its
  /// argument and return types are inferred.
  pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
  where
    F: Fn(&Package, &Environment) -> Result<Materialized, BuildError> + Send + Sync + 'static,
  {
    Self::new(name, f)
  }

  pub fn with_deps<I, S>(mut self, deps: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.deps.extend(deps.into_iter().map(Into::into));
    self
  }

  /// Marks the target as something a user asks for directly. Concrete
  /// targets are the roots of a project-wide materialization.
  pub fn concrete(mut self) -> Self {
    self.concrete = true;
    self
  }

  /// Forwards the using-deltas of this target's dependencies to its own
  /// dependents.
  pub fn transparent(mut self) -> Self {
    self.transparent = true;
    self
  }

  pub fn with_down(mut self, down: DownEnv) -> Self {
    self.down = down;
    self
  }

  /// Delta seen by this target only, not by its dependencies.
  pub fn with_local(mut self, local: Delta) -> Self {
    self.local = local;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn deps(&self) -> &[String] {
    &self.deps
  }

  pub fn is_concrete(&self) -> bool {
    self.concrete
  }

  pub fn is_transparent(&self) -> bool {
    self.transparent
  }

  pub fn down(&self) -> &DownEnv {
    &self.down
  }

  pub fn local(&self) -> &Delta {
    &self.local
  }

  pub fn builder(&self) -> &dyn BuildTarget {
    self.builder.as_ref()
  }
}

impl fmt::Debug for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Target")
      .field("name", &self.name)
      .field("deps", &self.deps)
      .field("concrete", &self.concrete)
      .field("transparent", &self.transparent)
      .field("down", &self.down)
      .field("local", &self.local)
      .finish_non_exhaustive()
  }
}

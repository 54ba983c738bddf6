//! Target graph materialization.
//!
//! Materialization walks the target dependency graph from its roots,
//! resolving each target's environment from its dependencies' using-deltas
//! and collecting the products every target emits into an [`ActionGraph`].
//!
//! # Submodules
//!
//! - [`materialize`] - the memoized, single-flight graph walk
//! - [`types`] - the finished action graph handed to emitters

mod materialize;
pub mod types;

pub(crate) use materialize::Materializer;
pub use types::{ActionGraph, GraphEntry};

use thiserror::Error;

use crate::env::EnvError;
use crate::rules::RuleConflict;
use crate::target::{BuildError, TargetId};

/// Errors raised while configuring a project or materializing its graph.
///
/// All of these are deterministic functions of the declarations; retrying
/// without changing them cannot succeed. Errors are `Clone` so a failed
/// materialization can be handed to every dependent waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error(transparent)]
  Env(#[from] EnvError),

  /// A target's environment could not be resolved, or its build function
  /// failed.
  #[error("target {target}: {error}")]
  Target {
    target: TargetId,
    #[source]
    error: BuildError,
  },

  #[error("output {output} produced by both {first} ({first_rule}) and {second} ({second_rule}) with different actions")]
  OutputCollision {
    output: String,
    first: TargetId,
    first_rule: String,
    second: TargetId,
    second_rule: String,
  },

  #[error("dependency cycle: {}", .0.join(" -> "))]
  DependencyCycle(Vec<String>),

  #[error("target {from} depends on unknown target '{label}'")]
  UnknownTarget { from: TargetId, label: String },

  #[error("malformed target label '{label}'")]
  InvalidLabel { label: String },

  #[error("no environment named '{0}'")]
  UnknownEnvironment(String),

  #[error("target {0} inherits its environment but was materialized without one")]
  NoInboundEnvironment(TargetId),

  #[error("more than one environment named '{0}'")]
  DuplicateEnvironment(String),

  #[error("duplicate package at '{0}'")]
  DuplicatePackage(String),

  #[error("duplicate target {0}")]
  DuplicateTarget(TargetId),

  #[error(transparent)]
  RuleConflict(#[from] RuleConflict),

  #[error("symlink {symlink} needs exactly one output, got {outputs:?}")]
  AmbiguousSymlink { symlink: String, outputs: Vec<String> },
}

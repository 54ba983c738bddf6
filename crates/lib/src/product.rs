//! Concrete build actions.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use crate::consts::SYMLINK_RULE;
use crate::env::Environment;
use crate::graph::GraphError;

/// One build action: a rule applied to inputs under a resolved environment.
///
/// Products are immutable once built. The environment should already be
/// reduced to the keys the rule needs, since its digest names the outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
  env: Environment,
  rule: String,
  outputs: Vec<String>,
  inputs: Vec<String>,
  implicit: BTreeSet<String>,
  order_only: BTreeSet<String>,
  symlink_as: Option<String>,
}

impl Product {
  pub fn new<I, S>(env: Environment, rule: impl Into<String>, outputs: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      env,
      rule: rule.into(),
      outputs: outputs.into_iter().map(Into::into).collect(),
      inputs: Vec::new(),
      implicit: BTreeSet::new(),
      order_only: BTreeSet::new(),
      symlink_as: None,
    }
  }

  pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.inputs.extend(inputs.into_iter().map(Into::into));
    self
  }

  /// Extra implicit inputs on top of the environment's.
  pub fn with_implicit<I, S>(mut self, paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.implicit.extend(paths.into_iter().map(Into::into));
    self
  }

  pub fn with_order_only<I, S>(mut self, paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.order_only.extend(paths.into_iter().map(Into::into));
    self
  }

  /// Publishes the single output under a stable alias.
  pub fn with_symlink(mut self, path: impl Into<String>) -> Self {
    self.symlink_as = Some(path.into());
    self
  }

  pub fn env(&self) -> &Environment {
    &self.env
  }

  pub fn rule(&self) -> &str {
    &self.rule
  }

  pub fn outputs(&self) -> &[String] {
    &self.outputs
  }

  pub fn inputs(&self) -> &[String] {
    &self.inputs
  }

  /// The environment's implicit inputs plus any added to this product.
  pub fn implicit(&self) -> BTreeSet<String> {
    self.env.implicit().union(&self.implicit).cloned().collect()
  }

  pub fn order_only(&self) -> BTreeSet<String> {
    self.env.order_only().union(&self.order_only).cloned().collect()
  }

  pub fn symlink_as(&self) -> Option<&str> {
    self.symlink_as.as_deref()
  }

  /// Every path this product writes, including its symlink.
  pub fn written_paths(&self) -> impl Iterator<Item = &str> {
    self.outputs.iter().map(String::as_str).chain(self.symlink_as())
  }

  /// Every path this product reads, in any role.
  pub fn read_paths(&self) -> BTreeSet<String> {
    let mut paths: BTreeSet<String> = self.inputs.iter().cloned().collect();
    paths.extend(self.implicit());
    paths.extend(self.order_only());
    paths
  }

  /// Fully resolved statements for the action emitter: this product, plus
  /// a symlink statement when an alias was requested.
  pub fn statements(&self) -> Result<Vec<BuildStatement>, GraphError> {
    let main = BuildStatement {
      rule: self.rule.clone(),
      outputs: self.outputs.clone(),
      inputs: self.inputs.clone(),
      implicit: self.implicit().into_iter().collect(),
      order_only: self.order_only().into_iter().collect(),
      variables: self.env.variables()?,
    };

    let Some(link) = &self.symlink_as else {
      return Ok(vec![main]);
    };

    let [output] = self.outputs.as_slice() else {
      return Err(GraphError::AmbiguousSymlink {
        symlink: link.clone(),
        outputs: self.outputs.clone(),
      });
    };

    let target = Path::new(link)
      .parent()
      .and_then(|dir| pathdiff::diff_paths(output, dir))
      .map(|rel| rel.to_string_lossy().into_owned())
      .unwrap_or_else(|| output.clone());

    let symlink = BuildStatement {
      rule: SYMLINK_RULE.to_string(),
      outputs: vec![link.clone()],
      inputs: Vec::new(),
      implicit: Vec::new(),
      order_only: vec![output.clone()],
      variables: BTreeMap::from([("target".to_string(), target)]),
    };

    Ok(vec![main, symlink])
  }
}

/// A product flattened to plain strings, ready to be written out in a build
/// description format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStatement {
  pub rule: String,
  pub outputs: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub inputs: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub implicit: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub order_only: Vec<String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub variables: BTreeMap<String, String>,
}

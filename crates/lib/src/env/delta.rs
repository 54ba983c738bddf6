//! Sparse environment changes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{EnvError, Value};
use crate::placeholder;

/// A sparse set of key/value changes, merged onto an environment through each
/// key's [`MergePolicy`](super::MergePolicy).
///
/// Besides typed keys, a delta carries the two pseudo-keys every build action
/// understands:
///
/// - `implicit`: paths that must exist before an action runs but are not
///   named on its command line
/// - `order_only`: ordering constraints that do not imply a content
///   dependency
///
/// Both accumulate by set union.
///
/// String values and paths are templates: `derive` interpolates them against
/// the environment being derived from. Values that are already resolved go
/// through the `*_resolved` builders.
///
/// Deltas compose left to right. Apart from override keys, where the last
/// writer wins, composition is associative per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
  #[serde(default)]
  values: BTreeMap<String, Value>,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  implicit: BTreeSet<String>,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  order_only: BTreeSet<String>,
}

impl Delta {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets `name` to `value`; a second call for the same name replaces the first.
  pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.values.insert(name.to_string(), value.into());
    self
  }

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

  /// Like [`Delta::with`], for values that are already resolved, such as
  /// computed output paths. They are merged verbatim instead of being
  /// interpolated against the environment.
  pub fn with_resolved(self, name: &str, value: impl Into<Value>) -> Self {
    let value = match value.into() {
      Value::Str(s) => Value::Str(placeholder::escape(&s)),
      Value::Seq(items) => Value::Seq(items.iter().map(|s| placeholder::escape(s)).collect()),
      Value::Bool(b) => Value::Bool(b),
    };
    self.with(name, value)
  }

  /// Like [`Delta::with_implicit`], for paths that are already resolved.
  pub fn with_implicit_resolved<I, S>(self, paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.with_implicit(paths.into_iter().map(|p| placeholder::escape(p.as_ref())))
  }

  /// Like [`Delta::with_order_only`], for paths that are already resolved.
  pub fn with_order_only_resolved<I, S>(self, paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.with_order_only(paths.into_iter().map(|p| placeholder::escape(p.as_ref())))
  }

  /// Builds a delta from already-typed values.
  pub fn from_values(values: BTreeMap<String, Value>) -> Self {
    Self {
      values,
      ..Self::default()
    }
  }

  /// Builds a delta from a raw declaration mapping, e.g. the `local` field of a
  /// target declaration. Only typed keys can be written this way.
  pub fn from_json(literal: &serde_json::Value) -> Result<Self, EnvError> {
    let map = literal.as_object().ok_or_else(|| EnvError::InvalidLiteral {
      key: "<delta>".to_string(),
      message: format!("a delta must be a mapping, got {literal}"),
    })?;

    let values = map
      .iter()
      .map(|(name, value)| Ok((name.clone(), Value::from_literal(name, value)?)))
      .collect::<Result<BTreeMap<_, _>, EnvError>>()?;

    Ok(Self::from_values(values))
  }

  pub fn values(&self) -> &BTreeMap<String, Value> {
    &self.values
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.values.get(name)
  }

  pub fn implicit(&self) -> &BTreeSet<String> {
    &self.implicit
  }

  pub fn order_only(&self) -> &BTreeSet<String> {
    &self.order_only
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty() && self.implicit.is_empty() && self.order_only.is_empty()
  }
}

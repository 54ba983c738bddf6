//! Immutable configuration snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

use super::{Delta, EnvError, KeyRegistry, Value};
use crate::placeholder::{self, Resolver};
use crate::util::hash::{Hashable, ObjectHash};

/// An immutable mapping from key names to resolved values, plus the
/// accumulated implicit and order-only paths.
///
/// Cloning is cheap (one `Arc`). Equality and hashing go through the content
/// digest, which is computed once at construction from ordered maps, so two
/// environments holding the same values are equal no matter in which order
/// their deltas were applied.
#[derive(Clone)]
pub struct Environment {
  inner: Arc<Inner>,
}

struct Inner {
  registry: Arc<KeyRegistry>,
  values: BTreeMap<String, Value>,
  implicit: BTreeSet<String>,
  order_only: BTreeSet<String>,
  digest: ObjectHash,
}

#[derive(Serialize)]
struct Contents<'a> {
  values: &'a BTreeMap<String, Value>,
  implicit: &'a BTreeSet<String>,
  order_only: &'a BTreeSet<String>,
}

impl Hashable for Contents<'_> {}

impl Environment {
  /// An environment with no values; every read falls back to key defaults.
  pub fn empty(registry: Arc<KeyRegistry>) -> Result<Self, EnvError> {
    Self::from_parts(registry, BTreeMap::new(), BTreeSet::new(), BTreeSet::new())
  }

  fn from_parts(
    registry: Arc<KeyRegistry>,
    values: BTreeMap<String, Value>,
    implicit: BTreeSet<String>,
    order_only: BTreeSet<String>,
  ) -> Result<Self, EnvError> {
    let digest = Contents {
      values: &values,
      implicit: &implicit,
      order_only: &order_only,
    }
    .compute_hash()
    .map_err(|e| EnvError::Hash { message: e.to_string() })?;

    Ok(Self {
      inner: Arc::new(Inner {
        registry,
        values,
        implicit,
        order_only,
        digest,
      }),
    })
  }

  pub fn registry(&self) -> &Arc<KeyRegistry> {
    &self.inner.registry
  }

  /// Stable content digest. Output paths are derived from it.
  pub fn digest(&self) -> &ObjectHash {
    &self.inner.digest
  }

  /// Whether `name` holds an explicit value (defaults do not count).
  pub fn contains(&self, name: &str) -> bool {
    self.inner.values.contains_key(name)
  }

  /// Names holding explicit values, in sorted order.
  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.inner.values.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.inner.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.values.is_empty()
  }

  pub fn implicit(&self) -> &BTreeSet<String> {
    &self.inner.implicit
  }

  pub fn order_only(&self) -> &BTreeSet<String> {
    &self.inner.order_only
  }

  /// The value for `name`, falling back to the key's default.
  pub fn get(&self, name: &str) -> Result<Option<&Value>, EnvError> {
    let key = self.inner.registry.require(name)?;
    Ok(self.inner.values.get(name).or(key.default()))
  }

  /// Like [`Environment::get`], failing with `MissingKey` when there is no value.
  pub fn value(&self, name: &str) -> Result<&Value, EnvError> {
    self.get(name)?.ok_or_else(|| EnvError::MissingKey {
      keys: vec![name.to_string()],
    })
  }

  pub fn flag(&self, name: &str) -> Result<bool, EnvError> {
    let value = self.value(name)?;
    value.as_bool().ok_or_else(|| EnvError::TypeMismatch {
      key: name.to_string(),
      expected: "a boolean",
      found: value.kind(),
    })
  }

  pub fn seq(&self, name: &str) -> Result<&[String], EnvError> {
    let value = self.value(name)?;
    value.as_seq().ok_or_else(|| EnvError::TypeMismatch {
      key: name.to_string(),
      expected: "a list of strings",
      found: value.kind(),
    })
  }

  /// The materialized string form of `name`, as substituted into commands.
  pub fn readout(&self, name: &str) -> Result<String, EnvError> {
    let key = self.inner.registry.require(name)?;
    Ok(key.readout(self.value(name)?))
  }

  /// Materialized strings for every explicit value, for the action emitter.
  pub fn variables(&self) -> Result<BTreeMap<String, String>, EnvError> {
    self
      .inner
      .values
      .keys()
      .map(|name| Ok((name.clone(), self.readout(name)?)))
      .collect()
  }

  /// Creates a new environment identical to this one except for the changes
  /// made by `delta`.
  ///
  /// String values in the delta are interpolated against `self` first, then
  /// merged through each key's policy. Unknown key names fail with
  /// `UnknownKey`, values of the wrong shape with `TypeMismatch`.
  pub fn derive(&self, delta: &Delta) -> Result<Self, EnvError> {
    if delta.is_empty() {
      return Ok(self.clone());
    }

    let registry = &self.inner.registry;
    let mut values = self.inner.values.clone();

    for (name, value) in delta.values() {
      let key = registry.require(name)?;
      let value = self.rewrite_value(value)?;
      key.check(&value)?;

      let merged = match values.remove(name).or_else(|| key.default().cloned()) {
        Some(existing) => key.policy().combine(existing, value),
        None => value,
      };
      values.insert(name.clone(), merged);
    }

    let mut implicit = self.inner.implicit.clone();
    for path in delta.implicit() {
      implicit.insert(self.rewrite_str(path)?);
    }
    let mut order_only = self.inner.order_only.clone();
    for path in delta.order_only() {
      order_only.insert(self.rewrite_str(path)?);
    }

    Self::from_parts(registry.clone(), values, implicit, order_only)
  }

  /// Applies `deltas` in order.
  pub fn derive_all<'a>(&self, deltas: impl IntoIterator<Item = &'a Delta>) -> Result<Self, EnvError> {
    deltas
      .into_iter()
      .try_fold(self.clone(), |env, delta| env.derive(delta))
  }

  /// Keeps only the explicit values named in `keys`. Implicit and order-only
  /// paths are always kept; they belong to every action.
  pub fn subset(&self, keys: &[&str]) -> Result<Self, EnvError> {
    for name in keys {
      self.inner.registry.require(name)?;
    }
    let values = self
      .inner
      .values
      .iter()
      .filter(|(name, _)| keys.contains(&name.as_str()))
      .map(|(name, value)| (name.clone(), value.clone()))
      .collect();
    self.with_values(values)
  }

  /// Returns an environment holding exactly the keys named in `keys`.
  ///
  /// Keys without an explicit value get their default copied in, so an absent
  /// key and a key set to its default produce the same digest. A key with
  /// neither is an error.
  pub fn subset_require(&self, keys: &[&str]) -> Result<Self, EnvError> {
    let mut values = BTreeMap::new();
    let mut missing = Vec::new();

    for name in keys {
      match self.get(name)? {
        Some(value) => {
          values.insert(name.to_string(), value.clone());
        }
        None => missing.push(name.to_string()),
      }
    }

    if !missing.is_empty() {
      return Err(EnvError::MissingKey { keys: missing });
    }
    self.with_values(values)
  }

  /// Drops the explicit values named in `keys`.
  pub fn without(&self, keys: &[&str]) -> Result<Self, EnvError> {
    let values = self
      .inner
      .values
      .iter()
      .filter(|(name, _)| !keys.contains(&name.as_str()))
      .map(|(name, value)| (name.clone(), value.clone()))
      .collect();
    self.with_values(values)
  }

  fn with_values(&self, values: BTreeMap<String, Value>) -> Result<Self, EnvError> {
    Self::from_parts(
      self.inner.registry.clone(),
      values,
      self.inner.implicit.clone(),
      self.inner.order_only.clone(),
    )
  }

  /// Interpolates key references in one string.
  pub fn rewrite_str(&self, input: &str) -> Result<String, EnvError> {
    placeholder::substitute(input, self)
  }

  /// Interpolates key references in every string, producing a new sequence.
  pub fn rewrite<S: AsRef<str>>(&self, inputs: &[S]) -> Result<Vec<String>, EnvError> {
    inputs.iter().map(|s| self.rewrite_str(s.as_ref())).collect()
  }

  fn rewrite_value(&self, value: &Value) -> Result<Value, EnvError> {
    Ok(match value {
      Value::Str(s) => Value::Str(self.rewrite_str(s)?),
      Value::Seq(items) => Value::Seq(self.rewrite(items)?),
      Value::Bool(b) => Value::Bool(*b),
    })
  }
}

impl Resolver for Environment {
  type Error = EnvError;

  fn resolve(&self, name: &str) -> Result<String, EnvError> {
    self.readout(name)
  }
}

impl PartialEq for Environment {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner.registry, &other.inner.registry) && self.inner.digest == other.inner.digest
  }
}

impl Eq for Environment {}

impl Hash for Environment {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.inner.digest.hash(state);
  }
}

impl std::fmt::Debug for Environment {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Environment")
      .field("digest", &self.inner.digest.0)
      .field("values", &self.inner.values)
      .field("implicit", &self.inner.implicit)
      .field("order_only", &self.inner.order_only)
      .finish()
  }
}

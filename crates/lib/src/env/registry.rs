//! The closed set of keys known to a project.

use std::collections::BTreeMap;

use super::{EnvError, Key, MergePolicy, Readout, Value};

/// Keeps track of environment key definitions.
///
/// A registry is filled while plugins are installed and is then frozen behind
/// an `Arc` shared by every [`Environment`](super::Environment); nothing
/// mutates it afterwards, so concurrent reads need no locking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRegistry {
  keys: BTreeMap<String, Key>,
}

impl KeyRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Defines a new environment key. Names must be unique.
  pub fn define(&mut self, key: Key) -> Result<(), EnvError> {
    if self.keys.contains_key(key.name()) {
      return Err(EnvError::DuplicateKey(key.name().to_string()));
    }
    self.keys.insert(key.name().to_string(), key);
    Ok(())
  }

  /// Declares a key from its parts and returns the declared key.
  pub fn declare(
    &mut self,
    name: &str,
    policy: MergePolicy,
    default: Option<Value>,
    readout: Option<Readout>,
  ) -> Result<Key, EnvError> {
    let mut key = Key::new(name, policy);
    if let Some(default) = default {
      key = key.with_default(default);
    }
    if let Some(readout) = readout {
      key = key.with_readout(readout);
    }
    if let Some(default) = key.default() {
      key.check(default)?;
    }
    self.define(key.clone())?;
    Ok(key)
  }

  pub fn get(&self, name: &str) -> Option<&Key> {
    self.keys.get(name)
  }

  /// Like [`KeyRegistry::get`], failing with `UnknownKey`.
  pub fn require(&self, name: &str) -> Result<&Key, EnvError> {
    self.get(name).ok_or_else(|| EnvError::UnknownKey(name.to_string()))
  }

  pub fn contains(&self, name: &str) -> bool {
    self.keys.contains_key(name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Key> {
    self.keys.values()
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }
}

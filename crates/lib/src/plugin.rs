//! Language plugins.

use crate::env::{Key, KeyRegistry};
use crate::graph::GraphError;
use crate::rules::{Rule, RuleCatalog};

/// A bundle of environment keys and rules for one language family.
pub trait Plugin {
  fn name(&self) -> &str;

  fn keys(&self) -> Vec<Key>;

  fn rules(&self) -> Vec<(&'static str, Rule)>;

  /// Declares the plugin's keys and rules. Keys must not already be
  /// declared; rules may be, if identical.
  fn install(&self, registry: &mut KeyRegistry, rules: &mut RuleCatalog) -> Result<(), GraphError> {
    for key in self.keys() {
      registry.define(key)?;
    }
    for (name, rule) in self.rules() {
      rules.add(name, rule)?;
    }
    Ok(())
  }
}

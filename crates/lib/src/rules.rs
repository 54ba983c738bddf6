//! Rule catalog consumed by the action emitter.
//!
//! A rule is a command template plus a description template. Templates use
//! the same `$name` placeholders as environment strings; `$in` and `$out` are
//! supplied by the emitter, everything else must be guaranteed present by the
//! environment subset of every product using the rule.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::SYMLINK_RULE;
use crate::placeholder::{self, PlaceholderError};

/// How compiler-emitted dependency information is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepsMode {
  /// Makefile-style depfiles as written by `-MD`/`-MMD`.
  Gcc,
  /// `/showIncludes` output.
  Msvc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
  pub command: String,
  pub description: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub depfile: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deps: Option<DepsMode>,
}

impl Rule {
  pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      command: command.into(),
      description: description.into(),
      depfile: None,
      deps: None,
    }
  }

  /// Sets where dependency information is written, relative to `$out`.
  pub fn with_depfile(mut self, depfile: impl Into<String>, deps: DepsMode) -> Self {
    self.depfile = Some(depfile.into());
    self.deps = Some(deps);
    self
  }

  /// Placeholder names referenced by the command, description and depfile
  /// templates.
  pub fn variables(&self) -> Result<BTreeSet<String>, PlaceholderError> {
    let mut vars = placeholder::references(&self.command)?;
    vars.extend(placeholder::references(&self.description)?);
    if let Some(depfile) = &self.depfile {
      vars.extend(placeholder::references(depfile)?);
    }
    Ok(vars)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rule '{name}' defined twice with different contents")]
pub struct RuleConflict {
  pub name: String,
}

/// All rules known to a project, by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleCatalog {
  rules: BTreeMap<String, Rule>,
}

impl Default for RuleCatalog {
  fn default() -> Self {
    Self::new()
  }
}

impl RuleCatalog {
  /// A catalog holding only the built-in symlink rule.
  pub fn new() -> Self {
    let mut rules = BTreeMap::new();
    rules.insert(SYMLINK_RULE.to_string(), Rule::new("ln -sf $target $out", "SYMLINK $out"));
    Self { rules }
  }

  /// Adds `rule` under `name`. Adding an identical rule again is a no-op.
  pub fn add(&mut self, name: impl Into<String>, rule: Rule) -> Result<(), RuleConflict> {
    let name = name.into();
    match self.rules.get(&name) {
      Some(existing) if *existing == rule => Ok(()),
      Some(_) => Err(RuleConflict { name }),
      None => {
        self.rules.insert(name, rule);
        Ok(())
      }
    }
  }

  pub fn get(&self, name: &str) -> Option<&Rule> {
    self.rules.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.rules.contains_key(name)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
    self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }
}

//! Project configuration.
//!
//! A project is configured from a JSON document naming the source root, the
//! build directory and the named environments targets start from:
//!
//! ```json
//! {
//!   "root": "src",
//!   "build_dir": "out",
//!   "environments": [
//!     { "name": "base", "contents": { "cc": "gcc", "c_flags": ["-O2"] } },
//!     { "name": "debug", "base": "base", "contents": { "c_flags": ["-g"] } }
//!   ]
//! }
//! ```
//!
//! `KILN_ROOT` and `KILN_BUILD_DIR` override the file values.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{BUILD_DIR_VAR, DEFAULT_BUILD_DIR, ROOT_VAR};
use crate::env::{Delta, EnvError, Value};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {message}")]
  Read { path: PathBuf, message: String },

  #[error("invalid project config: {0}")]
  Parse(#[from] serde_json::Error),
}

/// A named environment: an optional base plus the values layered on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentDecl {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base: Option<String>,
  #[serde(default)]
  pub contents: BTreeMap<String, serde_json::Value>,
}

impl EnvironmentDecl {
  /// The contents as a delta over the base environment.
  pub fn delta(&self) -> Result<Delta, EnvError> {
    let values = self
      .contents
      .iter()
      .map(|(name, literal)| Ok((name.clone(), Value::from_literal(name, literal)?)))
      .collect::<Result<BTreeMap<_, _>, EnvError>>()?;
    Ok(Delta::from_values(values))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
  #[serde(default = "default_root")]
  pub root: PathBuf,
  #[serde(default = "default_build_dir")]
  pub build_dir: PathBuf,
  /// Hash source contents into compile environments.
  #[serde(default)]
  pub fingerprint_sources: bool,
  #[serde(default)]
  pub environments: Vec<EnvironmentDecl>,
}

fn default_root() -> PathBuf {
  PathBuf::from(".")
}

fn default_build_dir() -> PathBuf {
  PathBuf::from(DEFAULT_BUILD_DIR)
}

impl Default for ProjectConfig {
  fn default() -> Self {
    Self {
      root: default_root(),
      build_dir: default_build_dir(),
      fingerprint_sources: false,
      environments: Vec::new(),
    }
  }
}

impl ProjectConfig {
  pub fn new(root: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      build_dir: build_dir.into(),
      ..Self::default()
    }
  }

  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(text)?)
  }

  /// Reads a config file, applying environment variable overrides.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;
    Ok(Self::from_json(&text)?.with_env_overrides())
  }

  pub fn with_environment(mut self, decl: EnvironmentDecl) -> Self {
    self.environments.push(decl);
    self
  }

  /// Applies `KILN_ROOT` and `KILN_BUILD_DIR` when set and non-empty.
  pub fn with_env_overrides(mut self) -> Self {
    if let Some(root) = env_path(ROOT_VAR) {
      debug!(root = %root.display(), "root overridden from environment");
      self.root = root;
    }
    if let Some(build_dir) = env_path(BUILD_DIR_VAR) {
      debug!(build_dir = %build_dir.display(), "build dir overridden from environment");
      self.build_dir = build_dir;
    }
    self
  }
}

fn env_path(var: &str) -> Option<PathBuf> {
  std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

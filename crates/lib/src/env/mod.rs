//! Typed configuration environments.
//!
//! An [`Environment`] is an immutable snapshot of configuration values keyed by
//! declared [`Key`]s. Environments are never mutated: applying a [`Delta`]
//! produces a new environment, merging each value through its key's
//! [`MergePolicy`]. Every environment carries a stable digest of its contents,
//! which is what output paths are derived from.
//!
//! # Submodules
//!
//! - [`key`] - key declarations and merge policies
//! - [`registry`] - the closed set of keys a project knows about
//! - [`value`] - the value types a key can hold
//! - [`delta`] - sparse changes applied through `derive`
//! - [`environment`] - the snapshot itself

pub mod delta;
pub mod environment;
pub mod key;
pub mod registry;
pub mod value;

pub use delta::Delta;
pub use environment::Environment;
pub use key::{Key, MergePolicy, Readout};
pub use registry::KeyRegistry;
pub use value::Value;

use thiserror::Error;

use crate::placeholder::PlaceholderError;

/// Errors raised while declaring keys or deriving environments.
///
/// These are configuration authoring errors; none of them is transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
  /// A key with this name is already declared in the registry.
  #[error("environment key '{0}' defined twice")]
  DuplicateKey(String),

  /// A delta, subset or placeholder named a key the registry does not know.
  #[error("use of undefined environment key '{0}'")]
  UnknownKey(String),

  /// Required keys have neither a value nor a default.
  #[error("required keys {keys:?} missing from environment")]
  MissingKey { keys: Vec<String> },

  /// A value does not fit the key's merge policy.
  #[error("environment key '{key}' expects {expected}, got {found}")]
  TypeMismatch {
    key: String,
    expected: &'static str,
    found: &'static str,
  },

  /// A raw declaration literal cannot be used as an environment value.
  #[error("invalid literal for environment key '{key}': {message}")]
  InvalidLiteral { key: String, message: String },

  /// A string could not be interpolated.
  #[error("placeholder error: {0}")]
  Placeholder(#[from] PlaceholderError),

  /// The environment contents could not be serialized for hashing.
  #[error("failed to hash environment: {message}")]
  Hash { message: String },
}

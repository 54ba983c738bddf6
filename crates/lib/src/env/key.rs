//! Environment key declarations.

use serde::{Deserialize, Serialize};

use super::{EnvError, Value};

/// How a new value for a key is merged with the value already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
  /// Single string; the last writer wins.
  Override,
  /// Sequence; new values are placed before the existing ones.
  Prepend,
  /// Sequence; new values are placed after the existing ones.
  Append,
  /// Boolean; the last writer wins. Usually paired with a [`Readout::Toggle`].
  Toggle,
}

impl MergePolicy {
  /// Shape of value this policy accepts, for error messages.
  pub fn expects(self) -> &'static str {
    match self {
      MergePolicy::Override => "a string",
      MergePolicy::Prepend | MergePolicy::Append => "a list of strings",
      MergePolicy::Toggle => "a boolean",
    }
  }

  fn accepts(self, value: &Value) -> bool {
    matches!(
      (self, value),
      (MergePolicy::Override, Value::Str(_))
        | (MergePolicy::Toggle, Value::Bool(_))
        | (MergePolicy::Prepend | MergePolicy::Append, Value::Seq(_))
    )
  }

  /// Merge `new` into `existing`. Both must already satisfy the policy.
  pub fn combine(self, existing: Value, new: Value) -> Value {
    match (self, existing, new) {
      (MergePolicy::Append, Value::Seq(mut lhs), Value::Seq(rhs)) => {
        lhs.extend(rhs);
        Value::Seq(lhs)
      }
      (MergePolicy::Prepend, Value::Seq(lhs), Value::Seq(mut rhs)) => {
        rhs.extend(lhs);
        Value::Seq(rhs)
      }
      (_, _, new) => new,
    }
  }
}

/// How a value is materialized into a string token for command lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readout {
  /// A boolean becomes one of two distinct tokens.
  Toggle { on: String, off: String },
  /// A sequence is joined with `separator`.
  Join { separator: String },
}

/// A declared configuration slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
  name: String,
  policy: MergePolicy,
  default: Option<Value>,
  readout: Option<Readout>,
}

impl Key {
  /// Creates a key. Sequence keys default to the empty list unless a default
  /// is given with [`Key::with_default`].
  pub fn new(name: impl Into<String>, policy: MergePolicy) -> Self {
    let default = match policy {
      MergePolicy::Prepend | MergePolicy::Append => Some(Value::Seq(Vec::new())),
      MergePolicy::Override | MergePolicy::Toggle => None,
    };
    Self {
      name: name.into(),
      policy,
      default,
      readout: None,
    }
  }

  /// A single string that allows overrides.
  pub fn overridable_string(name: impl Into<String>) -> Self {
    Self::new(name, MergePolicy::Override)
  }

  /// A single bool that allows overrides.
  pub fn overridable_bool(name: impl Into<String>) -> Self {
    Self::new(name, MergePolicy::Toggle)
  }

  /// A string sequence combined by appending.
  pub fn appending(name: impl Into<String>) -> Self {
    Self::new(name, MergePolicy::Append)
  }

  /// A string sequence combined by prepending. Relevant when linking C
  /// programs, where dependents must precede their dependencies.
  pub fn prepending(name: impl Into<String>) -> Self {
    Self::new(name, MergePolicy::Prepend)
  }

  pub fn with_default(mut self, default: impl Into<Value>) -> Self {
    self.default = Some(default.into());
    self
  }

  pub fn with_readout(mut self, readout: Readout) -> Self {
    self.readout = Some(readout);
    self
  }

  /// Shorthand for a [`Readout::Toggle`].
  pub fn with_toggle(self, on: &str, off: &str) -> Self {
    self.with_readout(Readout::Toggle {
      on: on.to_string(),
      off: off.to_string(),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn policy(&self) -> MergePolicy {
    self.policy
  }

  pub fn default(&self) -> Option<&Value> {
    self.default.as_ref()
  }

  /// Fails with `TypeMismatch` if `value` does not fit this key's policy.
  pub fn check(&self, value: &Value) -> Result<(), EnvError> {
    if self.policy.accepts(value) {
      Ok(())
    } else {
      Err(EnvError::TypeMismatch {
        key: self.name.clone(),
        expected: self.policy.expects(),
        found: value.kind(),
      })
    }
  }

  /// Materialize `value` as the string token used on command lines.
  pub fn readout(&self, value: &Value) -> String {
    match (value, &self.readout) {
      (Value::Str(s), _) => s.clone(),
      (Value::Bool(b), Some(Readout::Toggle { on, off })) => {
        if *b {
          on.clone()
        } else {
          off.clone()
        }
      }
      (Value::Bool(b), _) => b.to_string(),
      (Value::Seq(items), Some(Readout::Join { separator })) => items.join(separator),
      (Value::Seq(items), _) => items.join(" "),
    }
  }
}

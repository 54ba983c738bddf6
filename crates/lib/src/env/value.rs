//! Values stored in an environment.

use serde::{Deserialize, Serialize};

use super::EnvError;

/// A resolved environment value.
///
/// Serialized untagged, so declaration files can write values as plain JSON
/// strings, booleans and string arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Str(String),
  Bool(bool),
  Seq(Vec<String>),
}

impl Value {
  /// Short name of the value's shape, used in error messages.
  pub fn kind(&self) -> &'static str {
    match self {
      Value::Str(_) => "a string",
      Value::Bool(_) => "a boolean",
      Value::Seq(_) => "a list of strings",
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_seq(&self) -> Option<&[String]> {
    match self {
      Value::Seq(items) => Some(items),
      _ => None,
    }
  }

  /// Convert a raw declaration literal into a value.
  ///
  /// A bare string is never treated as a one-element sequence; the key's
  /// policy check rejects it later if the key holds a sequence.
  pub fn from_literal(key: &str, literal: &serde_json::Value) -> Result<Value, EnvError> {
    match literal {
      serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
      serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
      serde_json::Value::Array(items) => items
        .iter()
        .map(|item| {
          item.as_str().map(str::to_string).ok_or_else(|| EnvError::InvalidLiteral {
            key: key.to_string(),
            message: format!("expected list of strings, got element {item}"),
          })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Seq),
      other => Err(EnvError::InvalidLiteral {
        key: key.to_string(),
        message: format!("values must be strings, booleans or lists of strings, got {other}"),
      }),
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Str(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::Str(s)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<Vec<String>> for Value {
  fn from(items: Vec<String>) -> Self {
    Value::Seq(items)
  }
}

impl From<Vec<&str>> for Value {
  fn from(items: Vec<&str>) -> Self {
    Value::Seq(items.into_iter().map(str::to_string).collect())
  }
}

impl<const N: usize> From<[&str; N]> for Value {
  fn from(items: [&str; N]) -> Self {
    Value::Seq(items.iter().map(|s| s.to_string()).collect())
  }
}

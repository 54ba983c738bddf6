//! Placeholder parsing and substitution for environment interpolation.
//!
//! Strings flowing through an [`Environment`](crate::env::Environment) (delta
//! literals, source names, rule templates) may reference environment keys.
//! This module parses those references and substitutes resolved values.
//!
//! # Placeholder Formats
//!
//! - `$name` - the materialized value of key `name`; the name runs over
//!   ASCII letters, digits and `_`
//! - `${name}` - same, delimited, for use next to identifier characters
//!
//! # Escaping
//!
//! `$$` produces a literal `$`. Any other character after a `$` is an error,
//! so a typo never silently passes through to a command line.
//!
//! # Example
//!
//! ```
//! use kiln_lib::placeholder::{parse, Segment};
//!
//! let segments = parse("-I${root}/include $$HOME").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("-I".to_string()),
//!     Segment::Key("root".to_string()),
//!     Segment::Literal("/include $HOME".to_string()),
//! ]);
//! ```

use std::collections::BTreeSet;

use thiserror::Error;

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A reference to a key, to be resolved
  Key(String),
}

/// Errors that can occur during placeholder parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("empty placeholder at position {0}")]
  Empty(usize),

  #[error("malformed placeholder at position {position} in '{input}'")]
  Malformed { input: String, position: usize },
}

/// Trait for resolving key references during substitution.
pub trait Resolver {
  type Error: From<PlaceholderError>;

  /// Resolve a key name to its materialized string form.
  fn resolve(&self, name: &str) -> Result<String, Self::Error>;
}

fn is_name_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed, empty, or a `$` is followed
/// by a character that cannot start a name.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();
        literal.push('$');
      }
      Some((_, '{')) => {
        chars.next();

        let mut name = String::new();
        let mut found_close = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            found_close = true;
            break;
          }
          name.push(c);
        }

        if !found_close {
          return Err(PlaceholderError::Unclosed(pos));
        }
        if name.is_empty() {
          return Err(PlaceholderError::Empty(pos));
        }
        if !name.chars().all(is_name_char) {
          return Err(PlaceholderError::Malformed {
            input: input.to_string(),
            position: pos,
          });
        }

        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Key(name));
      }
      Some(&(_, c)) if is_name_char(c) => {
        let mut name = String::new();
        while let Some(&(_, c)) = chars.peek() {
          if !is_name_char(c) {
            break;
          }
          name.push(c);
          chars.next();
        }

        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Key(name));
      }
      _ => {
        return Err(PlaceholderError::Malformed {
          input: input.to_string(),
          position: pos,
        });
      }
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Collect the distinct key names referenced by `input`.
pub fn references(input: &str) -> Result<BTreeSet<String>, PlaceholderError> {
  Ok(
    parse(input)?
      .into_iter()
      .filter_map(|segment| match segment {
        Segment::Key(name) => Some(name),
        Segment::Literal(_) => None,
      })
      .collect(),
  )
}

/// Quote `input` so that substituting it yields `input` unchanged.
pub fn escape(input: &str) -> String {
  input.replace('$', "$$")
}

/// Substitute all placeholders in a string using the provided resolver.
///
/// Strings without a `$` are returned as-is without parsing.
pub fn substitute<R: Resolver>(input: &str, resolver: &R) -> Result<String, R::Error> {
  if !input.contains('$') {
    return Ok(input.to_string());
  }
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments<R: Resolver>(segments: &[Segment], resolver: &R) -> Result<String, R::Error> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Key(name) => result.push_str(&resolver.resolve(name)?),
    }
  }

  Ok(result)
}

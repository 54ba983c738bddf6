//! Source content fingerprints.
//!
//! Output paths are named by environment digests, so anything that should
//! force a new output path has to end up in an environment. A fingerprint
//! turns a source file into a string that compile steps can fold into their
//! environment; [`PathOnly`] leaves the source's identity to its path alone.

use std::path::Path;

use crate::target::BuildError;
use crate::util::hash::hash_file;

pub trait SourceFingerprint: Send + Sync {
  /// A string identifying the contents of `path`, or `None` when contents
  /// are not tracked.
  fn fingerprint(&self, path: &Path) -> Result<Option<String>, BuildError>;
}

/// Sources are identified by path only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathOnly;

impl SourceFingerprint for PathOnly {
  fn fingerprint(&self, _path: &Path) -> Result<Option<String>, BuildError> {
    Ok(None)
  }
}

/// Sources are identified by the SHA-256 of their contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDigest;

impl SourceFingerprint for ContentDigest {
  fn fingerprint(&self, path: &Path) -> Result<Option<String>, BuildError> {
    Ok(Some(hash_file(path)?.0))
  }
}

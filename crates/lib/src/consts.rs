//! Crate-wide constants.

/// Number of hex characters kept from a SHA-256 digest when it names a
/// directory in the build tree.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Directory under the build dir holding environment-addressed outputs.
pub const ENV_DIR: &str = "env";

/// Directory under the build dir holding stable, human-addressable symlinks.
pub const LATEST_DIR: &str = "latest";

/// Name of the built-in rule that materializes `symlink_as` aliases.
pub const SYMLINK_RULE: &str = "symlink_product";

/// Build directory used when the configuration does not name one.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Environment variable overriding the configured build directory.
pub const BUILD_DIR_VAR: &str = "KILN_BUILD_DIR";

/// Environment variable overriding the configured project root.
pub const ROOT_VAR: &str = "KILN_ROOT";

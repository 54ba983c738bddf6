//! C-family targets: compiled objects, static libraries and linked programs.
//!
//! Every action runs in an environment reduced to the keys its command line
//! reads, so an object's path changes when its compiler or flags change and
//! for nothing else. A program's link environment accumulates the objects
//! and archives it links, so any change upstream gives the program a new path
//! too; the stable name lives in the `latest` tree as a symlink.

use std::collections::HashSet;
use std::path::Path;

use crate::env::{Delta, Environment, Key};
use crate::plugin::Plugin;
use crate::product::Product;
use crate::project::Package;
use crate::rules::{DepsMode, Rule};
use crate::target::{BuildError, DownEnv, Materialized, Target};

/// Dependency tracking mode. `true` reads out as `-MD` (system headers
/// tracked), `false` as `-MMD`. Defaults to `false`, so compile commands
/// track user headers only unless an environment turns this on.
pub const DEPS_INCLUDE_SYSTEM: &str = "c_deps_include_system";
pub const LINK_SRCS: &str = "c_link_srcs";
pub const LINK_FLAGS: &str = "c_link_flags";
pub const CC: &str = "cc";
pub const CXX: &str = "cxx";
pub const ASPP: &str = "aspp";
pub const AR: &str = "ar";
pub const C_FLAGS: &str = "c_flags";
pub const CXX_FLAGS: &str = "cxx_flags";
pub const ASPP_FLAGS: &str = "aspp_flags";
pub const ARCHIVE_PRODUCTS: &str = "c_library_archive_products";
pub const WHOLE_ARCHIVE: &str = "c_library_whole_archive";
pub const WHOLE_ARCHIVE_PREFIX: &str = "c_whole_archive_prefix";
pub const WHOLE_ARCHIVE_SUFFIX: &str = "c_whole_archive_suffix";
pub const SOURCE_DIGEST: &str = "c_source_digest";

pub const COMPILE_C_RULE: &str = "compile_c_obj";
pub const COMPILE_CXX_RULE: &str = "compile_cxx_obj";
pub const ASSEMBLE_RULE: &str = "assemble_obj_pp";
pub const LINK_RULE: &str = "link_c_program";
pub const ARCHIVE_RULE: &str = "archive_c_library";

const LINK_KEYS: &[&str] = &[CXX, LINK_SRCS, LINK_FLAGS];
const ARCHIVE_KEYS: &[&str] = &[AR];

/// Compile rule and the keys its command line reads, by source extension.
fn compile_rule(source: &str) -> Result<(&'static str, [&'static str; 3]), BuildError> {
  let ext = Path::new(source).extension().and_then(|e| e.to_str());
  match ext {
    Some("c") => Ok((COMPILE_C_RULE, [DEPS_INCLUDE_SYSTEM, CC, C_FLAGS])),
    Some("cc" | "cpp") => Ok((COMPILE_CXX_RULE, [DEPS_INCLUDE_SYSTEM, CXX, CXX_FLAGS])),
    Some("S") => Ok((ASSEMBLE_RULE, [DEPS_INCLUDE_SYSTEM, ASPP, ASPP_FLAGS])),
    _ => Err(BuildError::UnsupportedSourceType {
      file: source.to_string(),
    }),
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CPlugin;

impl Plugin for CPlugin {
  fn name(&self) -> &str {
    "c"
  }

  fn keys(&self) -> Vec<Key> {
    vec![
      Key::overridable_bool(DEPS_INCLUDE_SYSTEM)
        .with_default(false)
        .with_toggle("-MD", "-MMD"),
      Key::prepending(LINK_SRCS),
      Key::appending(LINK_FLAGS),
      Key::overridable_string(CC),
      Key::overridable_string(CXX),
      Key::overridable_string(ASPP),
      Key::overridable_string(AR),
      Key::appending(C_FLAGS),
      Key::appending(CXX_FLAGS),
      Key::appending(ASPP_FLAGS),
      Key::overridable_bool(ARCHIVE_PRODUCTS).with_default(false),
      Key::overridable_bool(WHOLE_ARCHIVE).with_default(false),
      Key::overridable_string(WHOLE_ARCHIVE_PREFIX).with_default("-Wl,--whole-archive"),
      Key::overridable_string(WHOLE_ARCHIVE_SUFFIX).with_default("-Wl,--no-whole-archive"),
      Key::overridable_string(SOURCE_DIGEST),
    ]
  }

  fn rules(&self) -> Vec<(&'static str, Rule)> {
    vec![
      (
        COMPILE_C_RULE,
        Rule::new("$cc $c_deps_include_system -MF $depfile $c_flags -c -o $out $in", "C $in")
          .with_depfile("$out.d", DepsMode::Gcc),
      ),
      (
        COMPILE_CXX_RULE,
        Rule::new("$cxx $c_deps_include_system -MF $depfile $cxx_flags -c -o $out $in", "CXX $in")
          .with_depfile("$out.d", DepsMode::Gcc),
      ),
      (
        ASSEMBLE_RULE,
        Rule::new("$aspp $c_deps_include_system -MF $depfile $aspp_flags -c -o $out $in", "AS $in")
          .with_depfile("$out.d", DepsMode::Gcc),
      ),
      (
        LINK_RULE,
        Rule::new("$cxx $c_link_flags -o $out $in $c_link_srcs", "LINK $out"),
      ),
      (ARCHIVE_RULE, Rule::new("$ar rcs $out $in", "AR $out")),
    ]
  }
}

/// Declaration of a linked program.
#[derive(Debug, Clone, Default)]
pub struct BinaryDecl {
  /// Named project environment the program and its dependencies start from.
  pub env: String,
  pub deps: Vec<String>,
  pub sources: Vec<String>,
  /// Seen by this program's own compile and link steps only.
  pub local: Delta,
  /// Layered on the named environment for the program and its dependencies.
  pub extra: Delta,
}

/// A concrete, opaque target compiling `sources` and linking them with
/// whatever its dependencies export.
pub fn binary(name: &str, decl: BinaryDecl) -> Target {
  let BinaryDecl {
    env,
    deps,
    sources,
    local,
    extra,
  } = decl;
  let program = name.to_string();

  Target::from_fn(name, move |package, env_local| {
    let objects = compile_sources(package, &sources, env_local)?;
    let obj_files = outputs(&objects);

    // Objects go into the link sources as well as the implicit set so they
    // are part of the program's environment digest.
    let program_env = env_local.subset_require(LINK_KEYS)?.derive(
      &Delta::new()
        .with_resolved(LINK_SRCS, obj_files.clone())
        .with_implicit_resolved(obj_files),
    )?;

    let link = package.linkpath(&program);
    let product = Product::new(
      program_env.clone(),
      LINK_RULE,
      [package.outpath(&program_env, &program)],
    )
    .with_symlink(link.clone());

    let using = Delta::new().with_implicit_resolved([link]);
    let mut products = objects;
    products.push(product);
    Ok(Materialized::new(vec![using], products))
  })
  .with_deps(deps)
  .with_down(DownEnv::Named { env, extra })
  .with_local(local)
  .concrete()
}

/// Declaration of a library.
#[derive(Debug, Clone, Default)]
pub struct LibraryDecl {
  pub deps: Vec<String>,
  pub sources: Vec<String>,
  pub local: Delta,
  /// Passed to dependents ahead of the library's own link inputs.
  pub using: Delta,
}

/// A transparent target compiling `sources` and exposing the result to its
/// dependents, either as one static archive or as the raw objects.
pub fn library(name: &str, decl: LibraryDecl) -> Target {
  let LibraryDecl {
    deps,
    sources,
    local,
    using,
  } = decl;
  let archive_name = format!("lib{name}.a");

  Target::from_fn(name, move |package, env_local| {
    let mut products = compile_sources(package, &sources, env_local)?;
    let obj_files = outputs(&products);

    let (outs, link_srcs) = if env_local.flag(ARCHIVE_PRODUCTS)? {
      let ar_env = env_local
        .subset_require(ARCHIVE_KEYS)?
        .derive(&Delta::new().with_resolved(LINK_SRCS, obj_files.clone()))?;
      let archive = package.outpath(&ar_env, &archive_name);
      products.push(Product::new(ar_env, ARCHIVE_RULE, [archive.clone()]).with_inputs(obj_files));

      let link_srcs: Vec<String> = if env_local.flag(WHOLE_ARCHIVE)? {
        let prefix = env_local.readout(WHOLE_ARCHIVE_PREFIX)?;
        let suffix = env_local.readout(WHOLE_ARCHIVE_SUFFIX)?;
        [prefix, archive.clone(), suffix]
          .into_iter()
          .filter(|s| !s.is_empty())
          .collect()
      } else {
        vec![archive.clone()]
      };
      (vec![archive], link_srcs)
    } else {
      (obj_files.clone(), obj_files)
    };

    let exported = Delta::new()
      .with_implicit_resolved(outs)
      .with_resolved(LINK_SRCS, link_srcs);
    Ok(Materialized::new(vec![using.clone(), exported], products))
  })
  .with_deps(deps)
  .with_local(local)
  .transparent()
}

fn compile_sources(package: &Package, sources: &[String], env: &Environment) -> Result<Vec<Product>, BuildError> {
  let mut seen = HashSet::new();
  env
    .rewrite(sources)?
    .iter()
    .map(|source| {
      let source = clean_source(source)?;
      if !seen.insert(source.clone()) {
        return Err(BuildError::DuplicateSource { file: source });
      }
      compile_object(package, &source, env)
    })
    .collect()
}

/// Lexically normalizes a source path relative to its package, so each file
/// has one spelling and its object stays inside the package's output tree.
fn clean_source(source: &str) -> Result<String, BuildError> {
  let invalid = || BuildError::InvalidSourcePath {
    file: source.to_string(),
  };
  if Path::new(source).has_root() {
    return Err(invalid());
  }

  let mut parts: Vec<&str> = Vec::new();
  for part in source.split('/') {
    match part {
      "" | "." => {}
      ".." => {
        parts.pop().ok_or_else(invalid)?;
      }
      part => parts.push(part),
    }
  }
  if parts.is_empty() {
    return Err(invalid());
  }
  Ok(parts.join("/"))
}

fn compile_object(package: &Package, source: &str, env: &Environment) -> Result<Product, BuildError> {
  let (rule, keys) = compile_rule(source)?;
  let input = package.inpath(source);

  let mut o_env = env.subset_require(&keys)?;
  if let Some(digest) = package.layout().fingerprint().fingerprint(Path::new(&input))? {
    o_env = o_env.derive(&Delta::new().with(SOURCE_DIGEST, digest))?;
  }

  let output = package.outpath(&o_env, &format!("{source}.o"));
  Ok(Product::new(o_env, rule, [output]).with_inputs([input]))
}

fn outputs(products: &[Product]) -> Vec<String> {
  products.iter().flat_map(|p| p.outputs().iter().cloned()).collect()
}

//! Output path sensitivity to environment keys and source contents.

use std::fs;

use kiln_lib::config::ProjectConfig;
use kiln_lib::plugins::c;
use kiln_lib::{ActionGraph, Delta};
use tempfile::TempDir;

use super::common::{binary, by_rule, config, library, link, project_with};

fn build(config: &ProjectConfig) -> ActionGraph {
  let mut project = project_with(config);
  project.add_target("lib", library("util", &[], &["util.c"])).unwrap();
  project
    .add_target("app", binary("app", &["//lib:util"], &["main.c"], Delta::new()))
    .unwrap();
  project.materialize().unwrap()
}

fn with_base_value(key: &str, value: serde_json::Value) -> ProjectConfig {
  let mut config = config();
  config.environments[0].contents.insert(key.to_string(), value);
  config
}

fn outputs(graph: &ActionGraph) -> Vec<String> {
  graph.products().flat_map(|p| p.outputs().to_vec()).collect()
}

#[test]
fn unrelated_key_does_not_move_outputs() {
  let plain = build(&config());
  let with_cxx_flags = build(&with_base_value(c::CXX_FLAGS, serde_json::json!(["-fno-rtti"])));

  assert_eq!(outputs(&plain), outputs(&with_cxx_flags));
}

#[test]
fn compile_flag_moves_objects_and_program() {
  let plain = build(&config());
  let debug = build(&with_base_value(c::C_FLAGS, serde_json::json!(["-O2", "-g"])));

  let objects = |graph: &ActionGraph| -> Vec<String> {
    by_rule(graph, c::COMPILE_C_RULE)
      .iter()
      .map(|p| p.outputs()[0].clone())
      .collect()
  };
  for (a, b) in objects(&plain).iter().zip(objects(&debug).iter()) {
    assert_ne!(a, b);
  }
  assert_ne!(link(&plain).outputs(), link(&debug).outputs());
  // The stable alias does not move.
  assert_eq!(link(&plain).symlink_as(), link(&debug).symlink_as());
}

#[test]
fn link_flag_moves_only_the_program() {
  let plain = build(&config());
  let stripped = build(&with_base_value(c::LINK_FLAGS, serde_json::json!(["-s"])));

  assert_eq!(
    by_rule(&plain, c::COMPILE_C_RULE)
      .iter()
      .map(|p| p.outputs().to_vec())
      .collect::<Vec<_>>(),
    by_rule(&stripped, c::COMPILE_C_RULE)
      .iter()
      .map(|p| p.outputs().to_vec())
      .collect::<Vec<_>>()
  );
  assert_ne!(link(&plain).outputs(), link(&stripped).outputs());
}

#[test]
fn program_lands_under_its_environment_digest() {
  let graph = build(&config());
  let program = link(&graph);

  assert_eq!(
    program.outputs()[0],
    format!("/out/env/{}/app/app", program.env().digest())
  );
  assert_eq!(program.symlink_as(), Some("/out/latest/app/app"));
}

#[test]
fn source_content_moves_program_when_fingerprinting() {
  let dir = TempDir::new().unwrap();
  let root = dir.path().join("src");
  fs::create_dir_all(root.join("app")).unwrap();
  fs::create_dir_all(root.join("lib")).unwrap();
  fs::write(root.join("app/main.c"), "int main(void) { return 0; }").unwrap();
  fs::write(root.join("lib/util.c"), "int util(void) { return 1; }").unwrap();

  let mut config = config();
  config.root = root.clone();
  config.build_dir = dir.path().join("out");
  config.fingerprint_sources = true;

  let before = build(&config);
  let again = build(&config);
  fs::write(root.join("lib/util.c"), "int util(void) { return 2; }").unwrap();
  let after = build(&config);

  assert_eq!(link(&before).outputs(), link(&again).outputs());
  assert_ne!(link(&before).outputs(), link(&after).outputs());

  let digests = by_rule(&after, c::COMPILE_C_RULE)
    .iter()
    .filter(|p| p.env().contains(c::SOURCE_DIGEST))
    .count();
  assert_eq!(digests, 2);
}

#[test]
fn source_content_is_ignored_without_fingerprinting() {
  let dir = TempDir::new().unwrap();
  let root = dir.path().join("src");
  fs::create_dir_all(root.join("lib")).unwrap();
  fs::write(root.join("lib/util.c"), "int util(void) { return 1; }").unwrap();

  let mut config = config();
  config.root = root.clone();

  let before = build(&config);
  fs::write(root.join("lib/util.c"), "int util(void) { return 2; }").unwrap();
  let after = build(&config);

  assert_eq!(link(&before).outputs(), link(&after).outputs());
}

#[test]
fn missing_source_fails_when_fingerprinting() {
  let dir = TempDir::new().unwrap();
  let mut config = config();
  config.root = dir.path().to_path_buf();
  config.fingerprint_sources = true;

  let mut project = project_with(&config);
  project
    .add_target("app", binary("app", &[], &["main.c"], Delta::new()))
    .unwrap();

  assert!(matches!(
    project.materialize().unwrap_err(),
    kiln_lib::GraphError::Target {
      error: kiln_lib::BuildError::Fingerprint { .. },
      ..
    }
  ));
}

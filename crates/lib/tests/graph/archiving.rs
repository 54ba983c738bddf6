//! Static archives, whole-archive markers and link input order.

use kiln_lib::plugins::c;
use kiln_lib::{Delta, TargetId};

use super::common::{binary, by_rule, library, link, link_srcs, project};

fn archived(on: bool) -> Delta {
  Delta::new().with(c::ARCHIVE_PRODUCTS, on)
}

#[test]
fn archived_library_emits_one_archive_over_its_objects() {
  let mut project = project();
  let id = project.add_target("lib", library("util", &[], &["a.c", "b.c"])).unwrap();
  let env = project.named_env("base").unwrap().derive(&archived(true)).unwrap();

  let graph = project.materialize_target(&id, Some(&env)).unwrap();
  let compiles = by_rule(&graph, c::COMPILE_C_RULE);
  let archives = by_rule(&graph, c::ARCHIVE_RULE);

  assert_eq!(graph.len(), 3);
  assert_eq!(compiles.len(), 2);
  assert_eq!(archives.len(), 1);

  let objects: Vec<String> = compiles.iter().map(|p| p.outputs()[0].clone()).collect();
  assert_eq!(archives[0].inputs(), objects.as_slice());
  assert!(archives[0].outputs()[0].ends_with("/lib/libutil.a"));
}

#[test]
fn unarchived_library_emits_only_objects() {
  let mut project = project();
  let id = project.add_target("lib", library("util", &[], &["a.c", "b.c"])).unwrap();
  let env = project.named_env("base").unwrap().derive(&archived(false)).unwrap();

  let graph = project.materialize_target(&id, Some(&env)).unwrap();
  assert_eq!(graph.len(), 2);
  assert!(graph.products().all(|p| p.rule() == c::COMPILE_C_RULE));
}

#[test]
fn unarchived_objects_become_link_inputs() {
  let mut project = project();
  project.add_target("lib", library("util", &[], &["a.c", "b.c"])).unwrap();
  project
    .add_target("app", binary("app", &["//lib:util"], &["main.c"], archived(false)))
    .unwrap();

  let graph = project.materialize().unwrap();
  let objects = |pkg: &str| -> Vec<String> {
    graph
      .products_of(&TargetId::new(pkg, if pkg == "lib" { "util" } else { "app" }))
      .filter(|p| p.rule() == c::COMPILE_C_RULE)
      .map(|p| p.outputs()[0].clone())
      .collect()
  };
  let lib_objects = objects("lib");
  let app_objects = objects("app");
  let program = link(&graph);

  let mut expected = app_objects.clone();
  expected.extend(lib_objects.iter().cloned());
  assert_eq!(link_srcs(program), expected);

  let implicit = program.implicit();
  for object in lib_objects.iter().chain(app_objects.iter()) {
    assert!(implicit.contains(object), "{object} should be an implicit link input");
  }
}

#[test]
fn archive_becomes_link_input_and_implicit_dependency() {
  let mut project = project();
  project.add_target("lib", library("util", &[], &["a.c"])).unwrap();
  project
    .add_target("app", binary("app", &["//lib:util"], &["main.c"], archived(true)))
    .unwrap();

  let graph = project.materialize().unwrap();
  let archive = by_rule(&graph, c::ARCHIVE_RULE)[0].outputs()[0].clone();
  let program = link(&graph);

  let srcs = link_srcs(program);
  assert_eq!(srcs.len(), 2);
  assert!(srcs[0].ends_with("/app/main.c.o"));
  assert_eq!(srcs[1], archive);
  assert!(program.implicit().contains(&archive));
}

#[test]
fn whole_archive_markers_wrap_the_archive() {
  let mut project = project();
  project.add_target("lib", library("util", &[], &["a.c"])).unwrap();
  project
    .add_target(
      "app",
      binary("app", &["//lib:util"], &["main.c"], archived(true).with(c::WHOLE_ARCHIVE, true)),
    )
    .unwrap();

  let graph = project.materialize().unwrap();
  let archive = by_rule(&graph, c::ARCHIVE_RULE)[0].outputs()[0].clone();
  let srcs = link_srcs(link(&graph));

  assert_eq!(
    srcs[1..],
    ["-Wl,--whole-archive".to_string(), archive, "-Wl,--no-whole-archive".to_string()]
  );
}

#[test]
fn empty_whole_archive_suffix_is_omitted() {
  let mut project = project();
  project.add_target("lib", library("util", &[], &["a.c"])).unwrap();
  let extra = archived(true)
    .with(c::WHOLE_ARCHIVE, true)
    .with(c::WHOLE_ARCHIVE_PREFIX, "-force_load")
    .with(c::WHOLE_ARCHIVE_SUFFIX, "");
  project
    .add_target("app", binary("app", &["//lib:util"], &["main.c"], extra))
    .unwrap();

  let graph = project.materialize().unwrap();
  let archive = by_rule(&graph, c::ARCHIVE_RULE)[0].outputs()[0].clone();
  assert_eq!(link_srcs(link(&graph))[1..], ["-force_load".to_string(), archive]);
}

#[test]
fn dependents_link_before_their_dependencies() {
  let mut project = project();
  project.add_target("base", library("core", &[], &["core.c"])).unwrap();
  project.add_target("lib", library("util", &["//base:core"], &["util.c"])).unwrap();
  project
    .add_target("app", binary("app", &["//lib:util"], &["main.c"], archived(true)))
    .unwrap();

  let graph = project.materialize().unwrap();
  let srcs = link_srcs(link(&graph));

  assert_eq!(srcs.len(), 3);
  assert!(srcs[0].ends_with("/app/main.c.o"));
  assert!(srcs[1].ends_with("/lib/libutil.a"));
  assert!(srcs[2].ends_with("/base/libcore.a"));
}

#[test]
fn mixed_languages_dispatch_to_their_rules() {
  let mut project = project();
  project
    .add_target("app", binary("app", &[], &["main.cc", "util.cpp", "start.S", "legacy.c"], Delta::new()))
    .unwrap();

  let graph = project.materialize().unwrap();
  assert_eq!(by_rule(&graph, c::COMPILE_CXX_RULE).len(), 2);
  assert_eq!(by_rule(&graph, c::ASSEMBLE_RULE).len(), 1);
  assert_eq!(by_rule(&graph, c::COMPILE_C_RULE).len(), 1);

  let asm = by_rule(&graph, c::ASSEMBLE_RULE)[0];
  assert_eq!(asm.env().keys().collect::<Vec<_>>(), [c::ASPP, c::ASPP_FLAGS, c::DEPS_INCLUDE_SYSTEM]);
}

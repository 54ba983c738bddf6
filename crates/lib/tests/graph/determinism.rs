//! Repeated, parallel and independent materializations agree.

use kiln_lib::{Delta, Project};

use super::common::{binary, library, project};

fn sample() -> Project {
  let mut project = project();
  project.add_target("base", library("core", &[], &["core.c", "asm/start.S"])).unwrap();
  project.add_target("lib", library("util", &["//base:core"], &["util.cc", "str.c"])).unwrap();
  project.add_target("lib", library("net", &["//base:core"], &["net.c"])).unwrap();
  project
    .add_target("app", binary("server", &["//lib:net", "//lib:util"], &["main.c"], Delta::new()))
    .unwrap();
  project
    .add_target(
      "app",
      binary(
        "tool",
        &["//lib:util"],
        &["tool.cpp"],
        Delta::new().with("c_library_archive_products", true),
      ),
    )
    .unwrap();
  project
}

#[test]
fn materializing_twice_is_identical() {
  let project = sample();
  let first = project.materialize().unwrap();
  let second = project.materialize().unwrap();

  assert_eq!(first, second);
  assert_eq!(first.statements().unwrap(), second.statements().unwrap());
}

#[test]
fn separate_projects_agree() {
  let a = sample().materialize().unwrap();
  let b = sample().materialize().unwrap();

  let outputs = |graph: &kiln_lib::ActionGraph| -> Vec<String> {
    graph.products().flat_map(|p| p.outputs().to_vec()).collect()
  };
  assert_eq!(outputs(&a), outputs(&b));
  assert_eq!(a.statements().unwrap(), b.statements().unwrap());
}

#[test]
fn parallel_matches_sequential() {
  let project = sample();
  let sequential = project.materialize().unwrap();
  let parallel = project.materialize_parallel().unwrap();

  assert_eq!(sequential.statements().unwrap(), parallel.statements().unwrap());
  assert_eq!(sequential, parallel);
}

#[test]
fn entries_are_dependencies_first() {
  let graph = sample().materialize().unwrap();
  let order: Vec<String> = graph.entries().iter().map(|e| e.target.to_string()).collect();

  let position = |id: &str| order.iter().position(|t| t == id).unwrap();
  assert!(position("//base:core") < position("//lib:net"));
  assert!(position("//lib:net") < position("//app:server"));
  assert!(position("//lib:util") < position("//app:server"));
  assert!(position("//app:server") < position("//app:tool"));
}

#[test]
fn every_product_reads_only_earlier_waves() {
  let graph = sample().materialize().unwrap();
  let waves = graph.waves().unwrap();

  let mut written = std::collections::HashSet::new();
  let produced: std::collections::HashSet<&str> = graph.products().flat_map(|p| p.written_paths()).collect();
  for wave in &waves {
    for product in wave {
      for path in product.read_paths() {
        if produced.contains(path.as_str()) {
          assert!(written.contains(&path), "{path} read before it is written");
        }
      }
    }
    for product in wave {
      written.extend(product.written_paths().map(str::to_string));
    }
  }
  assert_eq!(waves.iter().map(Vec::len).sum::<usize>(), graph.len());
}

//! Diamond dependencies: shared targets, memoization and override order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kiln_lib::target::DownEnv;
use kiln_lib::{Delta, Materialized, Product, Project, Target};

use super::common::project;

/// A transparent target exporting `cc = <name>` and counting its builds.
fn exporter(name: &'static str, deps: &[&str], builds: Arc<AtomicUsize>) -> Target {
  Target::from_fn(name, move |package, env| {
    builds.fetch_add(1, Ordering::SeqCst);
    let obj_env = env.subset_require(&["cc"])?;
    let product = Product::new(obj_env.clone(), "compile_c_obj", [package.outpath(&obj_env, &format!("{name}.o"))]);
    Ok(Materialized::new(vec![Delta::new().with("cc", name)], vec![product]))
  })
  .with_deps(deps.iter().map(|d| d.to_string()))
  .transparent()
}

/// A concrete target recording the `cc` it was materialized with.
fn recorder(deps: &[&str], seen: Arc<Mutex<Option<String>>>) -> Target {
  Target::from_fn("top", move |_, env| {
    let cc = env.readout("cc")?;
    *seen.lock().unwrap() = Some(cc);
    Ok(Materialized::default())
  })
  .with_deps(deps.iter().map(|d| d.to_string()))
  .with_down(DownEnv::Named {
    env: "base".to_string(),
    extra: Delta::new(),
  })
  .concrete()
}

struct Diamond {
  project: Project,
  d_builds: Arc<AtomicUsize>,
  seen: Arc<Mutex<Option<String>>>,
}

fn diamond(order: &[&str]) -> Diamond {
  let mut project = project();
  let d_builds = Arc::new(AtomicUsize::new(0));
  let seen = Arc::new(Mutex::new(None));
  let other = Arc::new(AtomicUsize::new(0));

  project.add_target("d", exporter("d", &[], d_builds.clone())).unwrap();
  project.add_target("a", exporter("a", &["//d:d"], other.clone())).unwrap();
  project.add_target("b", exporter("b", &["//d:d"], other)).unwrap();
  project.add_target("c", recorder(order, seen.clone())).unwrap();

  Diamond { project, d_builds, seen }
}

#[test]
fn shared_dependency_is_built_once() {
  let diamond = diamond(&["//a:a", "//b:b"]);
  let graph = diamond.project.materialize().unwrap();

  assert_eq!(diamond.d_builds.load(Ordering::SeqCst), 1);
  let d_entries = graph.entries().iter().filter(|e| e.target.name == "d").count();
  assert_eq!(d_entries, 1);
}

#[test]
fn shared_dependency_is_built_once_in_parallel() {
  let mut diamond = diamond(&["//a:a", "//b:b"]);
  // A second root reaching the same dependencies.
  let second = recorder(&["//b:b", "//a:a"], Arc::new(Mutex::new(None)));
  diamond.project.add_target("c2", second).unwrap();

  diamond.project.materialize_parallel().unwrap();
  assert_eq!(diamond.d_builds.load(Ordering::SeqCst), 1);
}

#[test]
fn override_follows_declared_dependency_order() {
  let forward = diamond(&["//a:a", "//b:b"]);
  forward.project.materialize().unwrap();
  assert_eq!(forward.seen.lock().unwrap().as_deref(), Some("b"));

  let backward = diamond(&["//b:b", "//a:a"]);
  backward.project.materialize().unwrap();
  assert_eq!(backward.seen.lock().unwrap().as_deref(), Some("a"));
}

#[test]
fn dependencies_apply_before_dependents() {
  // c depends on d directly, ahead of a; a's export still lands after d's.
  let diamond = diamond(&["//a:a", "//d:d"]);
  diamond.project.materialize().unwrap();
  assert_eq!(diamond.seen.lock().unwrap().as_deref(), Some("a"));
}

#[test]
fn dependents_see_dependency_exports() {
  let diamond = diamond(&["//a:a", "//b:b"]);
  let graph = diamond.project.materialize().unwrap();

  // d is built in base (cc = gcc); a and b both see d's export.
  let cc_of = |name: &str| -> String {
    graph
      .entries()
      .iter()
      .find(|e| e.target.name == name)
      .map(|e| e.products[0].env().readout("cc").unwrap())
      .unwrap()
  };
  assert_eq!(cc_of("d"), "gcc");
  assert_eq!(cc_of("a"), "d");
  assert_eq!(cc_of("b"), "d");
}

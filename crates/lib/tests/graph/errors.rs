//! Error reporting: every failure names the declaration it came from.

use kiln_lib::config::ProjectConfig;
use kiln_lib::env::EnvError;
use kiln_lib::target::DownEnv;
use kiln_lib::{BuildError, Delta, GraphError, Materialized, Product, Target, TargetId};

use super::common::{binary, library, project, project_with};

/// A concrete target writing `/out/shared.o` with `rule` from an environment
/// holding `cc`.
fn writer(name: &str, rule: &'static str, local: Delta) -> Target {
  Target::from_fn(name, move |_, env| {
    let env = env.subset_require(&["cc"])?;
    Ok(Materialized::new(vec![], vec![Product::new(env, rule, ["/out/shared.o"])]))
  })
  .with_down(DownEnv::Named {
    env: "base".to_string(),
    extra: Delta::new(),
  })
  .with_local(local)
  .concrete()
}

#[test]
fn unknown_source_extension_names_the_file() {
  let mut project = project();
  project.add_target("lib", library("util", &[], &["a.c", "data.xyz"])).unwrap();
  project.add_target("app", binary("app", &["//lib:util"], &["main.c"], Delta::new())).unwrap();

  let err = project.materialize().unwrap_err();
  assert_eq!(
    err,
    GraphError::Target {
      target: TargetId::new("lib", "util"),
      error: BuildError::UnsupportedSourceType {
        file: "data.xyz".to_string()
      },
    }
  );
  assert!(err.to_string().contains("//lib:util"));
}

#[test]
fn same_output_from_different_environments_collides() {
  let mut project = project();
  project.add_target("p1", writer("t1", "compile_c_obj", Delta::new())).unwrap();
  project
    .add_target("p2", writer("t2", "compile_c_obj", Delta::new().with("cc", "clang")))
    .unwrap();

  assert_eq!(
    project.materialize().unwrap_err(),
    GraphError::OutputCollision {
      output: "/out/shared.o".to_string(),
      first: TargetId::new("p1", "t1"),
      first_rule: "compile_c_obj".to_string(),
      second: TargetId::new("p2", "t2"),
      second_rule: "compile_c_obj".to_string(),
    }
  );
}

#[test]
fn collision_names_both_rules() {
  let mut project = project();
  project.add_target("p1", writer("t1", "compile_c_obj", Delta::new())).unwrap();
  project.add_target("p2", writer("t2", "assemble_obj_pp", Delta::new())).unwrap();

  let err = project.materialize().unwrap_err();
  assert!(matches!(
    err,
    GraphError::OutputCollision { ref first_rule, ref second_rule, .. }
      if first_rule == "compile_c_obj" && second_rule == "assemble_obj_pp"
  ));
  let message = err.to_string();
  assert!(message.contains("compile_c_obj") && message.contains("assemble_obj_pp"), "{message}");
}

#[test]
fn identical_products_are_emitted_once() {
  let mut project = project();
  project.add_target("p1", writer("t1", "compile_c_obj", Delta::new())).unwrap();
  project.add_target("p2", writer("t2", "compile_c_obj", Delta::new())).unwrap();

  let graph = project.materialize().unwrap();
  assert_eq!(graph.len(), 1);
  assert_eq!(graph.entries().len(), 2);
}

#[test]
fn dependency_cycle_aborts_materialization() {
  let mut project = project();
  project.add_target("a", library("a", &["//b:b"], &["a.c"])).unwrap();
  project.add_target("b", library("b", &["//a:a"], &["b.c"])).unwrap();
  project.add_target("app", binary("app", &["//a:a"], &["main.c"], Delta::new())).unwrap();

  assert!(matches!(
    project.materialize().unwrap_err(),
    GraphError::DependencyCycle(ref path) if path.len() == 3
  ));
}

#[test]
fn missing_link_driver_names_target_and_key() {
  let config = ProjectConfig::from_json(
    r#"{ "root": "/src", "build_dir": "/out",
         "environments": [ { "name": "base", "contents": { "cc": "gcc" } } ] }"#,
  )
  .unwrap();
  let mut project = project_with(&config);
  project.add_target("app", binary("app", &[], &["main.c"], Delta::new())).unwrap();

  let err = project.materialize().unwrap_err();
  assert_eq!(
    err,
    GraphError::Target {
      target: TargetId::new("app", "app"),
      error: BuildError::Env(EnvError::MissingKey {
        keys: vec!["cxx".to_string()]
      }),
    }
  );
  let message = err.to_string();
  assert!(message.contains("//app:app") && message.contains("cxx"), "{message}");
}

#[test]
fn misspelled_key_in_extra_delta() {
  let mut project = project();
  project
    .add_target("app", binary("app", &[], &["main.c"], Delta::new().with("c_flgas", ["-g"])))
    .unwrap();

  assert!(matches!(
    project.materialize().unwrap_err(),
    GraphError::Target { error: BuildError::Env(EnvError::UnknownKey(ref key)), .. } if key == "c_flgas"
  ));
}

#[test]
fn unknown_named_environment() {
  let mut project = project();
  let target = binary("app", &[], &["main.c"], Delta::new()).with_down(DownEnv::Named {
    env: "release".to_string(),
    extra: Delta::new(),
  });
  project.add_target("app", target).unwrap();

  assert_eq!(
    project.materialize().unwrap_err(),
    GraphError::UnknownEnvironment("release".to_string())
  );
}

#[test]
fn inheriting_root_needs_an_environment() {
  let mut project = project();
  let id = project.add_target("lib", library("util", &[], &["a.c"])).unwrap();

  assert_eq!(
    project.materialize_target(&id, None).unwrap_err(),
    GraphError::NoInboundEnvironment(id.clone())
  );
  let base = project.named_env("base").unwrap().clone();
  assert_eq!(project.materialize_target(&id, Some(&base)).unwrap().len(), 1);
}

#[test]
fn unknown_dependency_label() {
  let mut project = project();
  project.add_target("app", binary("app", &[":nope"], &["main.c"], Delta::new())).unwrap();

  assert_eq!(
    project.materialize().unwrap_err(),
    GraphError::UnknownTarget {
      from: TargetId::new("app", "app"),
      label: ":nope".to_string(),
    }
  );
}

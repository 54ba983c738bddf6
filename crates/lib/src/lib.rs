//! kiln-lib: environment composition and build graph construction
//!
//! This crate turns declared build targets into a graph of concrete build
//! actions:
//! - `Environment`: immutable, content-addressed configuration snapshots
//! - `Delta`: sparse changes merged onto environments through key policies
//! - `Target`: named build units that emit products and export using-deltas
//! - `Product`: one build action, the unit handed to action emitters
//! - `Project`: packages, named environments and materialization

pub mod config;
pub mod consts;
pub mod env;
pub mod fingerprint;
pub mod graph;
pub mod placeholder;
pub mod plugin;
pub mod plugins;
pub mod product;
pub mod project;
pub mod rules;
pub mod target;
pub mod util;

pub use env::{Delta, Environment, Key, KeyRegistry, MergePolicy, Value};
pub use graph::{ActionGraph, GraphError};
pub use product::{BuildStatement, Product};
pub use project::{Package, Project};
pub use target::{BuildError, Materialized, Target, TargetId};

//! Built-in language plugins.

pub mod c;

pub use c::CPlugin;

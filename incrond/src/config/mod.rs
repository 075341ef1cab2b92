// src/config/mod.rs

//! Daemon configuration.
//!
//! - [`model`] holds the typed [`Config`] with built-in defaults and the
//!   path helpers both binaries use.
//! - [`loader`] parses the `key = value` configuration file.

pub mod loader;
pub mod model;

pub use loader::{load, load_default};
pub use model::Config;

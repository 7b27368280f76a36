// src/config/mod.rs

//! Pipeline files.
//!
//! - `model.rs` maps the TOML layout and the validated result.
//! - `loader.rs` reads a file from disk.
//! - `validate.rs` turns a raw file into a [`ConfigFile`].
//! - `duration.rs` parses the `<n>ms|s|m|h` duration strings.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, Settings, TaskConfig, TaskSpec};

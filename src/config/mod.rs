// src/config/mod.rs

//! Daemon configuration: optional TOML file + CLI overrides + defaults.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{CancelSection, ConfigFile, Overrides, RawConfigFile, ServerSection};

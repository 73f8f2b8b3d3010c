// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, Overrides, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** apply defaults
/// or validate values. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load the optional config file, layer CLI overrides on top and validate.
///
/// Without a path, only the overrides and built-in defaults are used.
pub fn load_and_validate(path: Option<&Path>, overrides: Overrides) -> Result<ConfigFile> {
    let raw = match path {
        Some(path) => load_from_path(path)?,
        None => RawConfigFile::default(),
    };
    ConfigFile::try_from(raw.with_overrides(overrides))
}

/// `Execd.toml` in the current directory, used when it exists and no
/// `--config` was given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Execd.toml")
}

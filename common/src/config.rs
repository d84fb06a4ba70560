//! Configuration loading for the relay network programs.

use alloy_primitives::Address;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Classify, ErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("user directories for {0:?} cannot be determined")]
    NoUserDirs(String),
    #[error("cannot read config file: {0}")]
    CannotRead(std::io::Error),
    #[error("cannot create config file with defaults: {0}")]
    CannotCreateDefault(std::io::Error),
    #[error("cannot parse TOML config: {0}")]
    CannotParseToml(toml::de::Error),
}

impl Classify for LoadError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Startup
    }
}

/// Program configuration loader.
///
/// ```no_run
/// // uses ~/.config/blockrelay-validator dir
/// let loader = blockrelay_common::config::Loader::new("blockrelay-validator")?;
///
/// // loads ~/.config/blockrelay-validator/blockrelay-validator.toml
/// let config: toml::Value = loader.load()?;
/// # Ok::<(), blockrelay_common::config::LoadError>(())
/// ```
pub struct Loader {
    program_name: String,
    config_dir: PathBuf,
}

impl Loader {
    /// Creates a loader using the XDG user directory layout,
    /// e.g. `~/.config/<program-name>` or `~/Library/Application Support/com.blockrelay.<program-name>`.
    pub fn new(program_name: &str) -> Result<Self, LoadError> {
        use LoadError::*;
        let dirs = directories::ProjectDirs::from("com", "blockrelay", program_name)
            .ok_or(NoUserDirs(program_name.into()))?;
        Self::new_with_dir(program_name, dirs.config_dir())
    }

    pub fn new_with_dir(program_name: &str, config_dir: &Path) -> Result<Self, LoadError> {
        Ok(Self { program_name: program_name.to_string(), config_dir: config_dir.into() })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Loads the main TOML config file, named after the program itself.
    pub fn load<T: DeserializeOwned>(&self) -> Result<T, LoadError> {
        self.load_named(&self.program_name)
    }

    /// Loads `<config_dir>/<name>.toml`.
    pub fn load_named<T: DeserializeOwned>(&self, name: &str) -> Result<T, LoadError> {
        load_file(&self.config_dir.join(PathBuf::from(name).with_extension("toml")))
    }

    /// Loads a TOML config file; if not found, creates it with the given default contents.
    pub fn load_or_create_named<T: DeserializeOwned>(
        &self, name: &str, default: &str,
    ) -> Result<T, LoadError> {
        use LoadError::*;
        let path = self.config_dir.join(PathBuf::from(name).with_extension("toml"));
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                info!(path = path.to_str(), "creating config with default contents");
                std::fs::create_dir_all(&self.config_dir).map_err(CannotCreateDefault)?;
                std::fs::write(&path, default).map_err(CannotCreateDefault)?;
                default.into()
            },
            Err(err) => return Err(CannotRead(err)),
        };
        toml::from_str::<T>(&content).map_err(CannotParseToml)
    }

    pub fn load_or_create<T: DeserializeOwned>(&self, default: &str) -> Result<T, LoadError> {
        self.load_or_create_named(&self.program_name, default)
    }
}

/// Loads a TOML file from an explicit path, used when a `--config` flag is given.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = std::fs::read_to_string(path).map_err(LoadError::CannotRead)?;
    toml::from_str::<T>(&content).map_err(LoadError::CannotParseToml)
}

/// Where the block registry lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub address: Address,
}

/// A seed RPC entry; `rpc` may hold comma-separated alternates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainEndpoint {
    pub chain_id: u64,
    pub rpc: String,
}

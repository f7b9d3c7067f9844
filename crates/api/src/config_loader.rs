//! Loads the single JSON configuration document the engine runs from.
//! Failure here is fail-stop: no worker starts against a config that
//! didn't parse or didn't validate.

use std::path::PathBuf;

use thiserror::Error;
use warden_infra::config::EngineConfig;
use warden_infra::InitError;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Invalid(#[from] InitError),
}

pub fn load() -> Result<EngineConfig, ConfigLoadError> {
    let path = std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("volume/config.json"));

    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigLoadError::Read {
        path: path.clone(),
        source,
    })?;

    let config: EngineConfig =
        serde_json::from_str(&raw).map_err(|source| ConfigLoadError::Parse { path: path.clone(), source })?;

    config.validate()?;
    Ok(config)
}

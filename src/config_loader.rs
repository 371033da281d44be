//! Loads an `EngineConfig` from, in priority order: CLI flags, an optional
//! `storyweave.toml` file, then the built-in defaults. Loading itself is outside
//! the engine's scope (the engine consumes an already-built `EngineConfig`); this
//! module is the thin adapter that produces one for the `storyweave` binary.

use crate::cli::types::ConfigOverrides;
use crate::engine::config::{ConfigError, EngineConfig};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

pub fn load(path: &Path, overrides: &ConfigOverrides) -> Result<EngineConfig, LoadError> {
    let mut config = if path.exists() {
        read_file(path)?
    } else {
        EngineConfig::default()
    };

    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<EngineConfig, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| LoadError::Parse {
        path: path.display().to_string(),
        source,
    })
}

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ValidationReport;

/// Failure loading or validating a [`PoolConfig`](crate::config::PoolConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {}", .0.summary())]
    Invalid(ValidationReport),
}

/// Failure reading or seeding the predefined names file.
#[derive(Debug, Error)]
pub enum NamesError {
    #[error("failed to read names file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create default names file {path}: {source}")]
    CreateDefault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

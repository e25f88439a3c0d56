use std::path::PathBuf;
use thiserror::Error;

use super::backend::BackendError;
use super::config::{ConfigError, Phase};
use crate::core::io::npy::NpyError;
use crate::core::io::pdb::PdbError;
use crate::core::models::system::HybridSystemError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Run directory already exists and will not be overwritten: {}", path.display())]
    RunExists { path: PathBuf },

    #[error("File system error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Collaborator failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid hybrid system: {0}")]
    HybridSystem(#[from] HybridSystemError),

    #[error("Hybrid factory returned no system for phase '{0}'")]
    MissingPhase(Phase),

    #[error("Failed to write array file {}: {source}", path.display())]
    Array {
        path: PathBuf,
        #[source]
        source: NpyError,
    },

    #[error("Failed to write structure file {}: {source}", path.display())]
    Structure {
        path: PathBuf,
        #[source]
        source: PdbError,
    },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

//! Interfaces to the external collaborators that do the chemistry.
//!
//! Topology proposal, hybrid system construction, relaxation dynamics and atom-map
//! rendering are not implemented in this crate. The workflow talks to them through
//! the traits below; [`process::ProcessBackend`] implements all of them by calling an
//! external program.

pub mod process;

use super::config::{Phase, SetupConfig};
use crate::core::models::mapping::LigandAtomMap;
use crate::core::models::state::RelaxedState;
use crate::core::models::system::HybridSystem;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to launch collaborator '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while talking to the collaborator: {0}")]
    Io(#[from] std::io::Error),

    #[error("Collaborator exited with status {status} during '{operation}': {stderr}")]
    Status {
        operation: &'static str,
        status: String,
        stderr: String,
    },

    #[error("Malformed collaborator response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Collaborator response is inconsistent: {0}")]
    Protocol(String),

    #[error("Collaborator reported an error: {0}")]
    Remote(String),
}

/// Everything the hybrid factory produces for one transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSetup {
    pub systems: Vec<HybridSystem>,
    /// Ligand atom map without receptor or solvent offsets.
    pub atom_map: LigandAtomMap,
}

impl HybridSetup {
    pub fn system(&self, phase: Phase) -> Option<&HybridSystem> {
        self.systems.iter().find(|s| s.phase == phase)
    }
}

/// Settings for minimizing and equilibrating a hybrid system before its state is
/// captured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaxationRequest {
    pub temperature_kelvin: f64,
    pub iterations: u64,
    pub steps_per_iteration: u64,
    pub timestep_fs: f64,
    pub collision_rate_per_ps: f64,
    pub splitting: String,
    pub platform: String,
    pub platform_properties: BTreeMap<String, String>,
}

impl RelaxationRequest {
    pub fn from_config(config: &SetupConfig) -> Self {
        let relaxation = &config.relaxation;
        Self {
            temperature_kelvin: config.system.temperature_kelvin,
            iterations: relaxation.iterations,
            steps_per_iteration: relaxation.steps_per_iteration,
            timestep_fs: relaxation.timestep_fs,
            collision_rate_per_ps: relaxation.collision_rate_per_ps,
            splitting: relaxation.splitting.to_string(),
            platform: relaxation.platform.clone(),
            platform_properties: platform_properties(&relaxation.platform),
        }
    }
}

/// Mixed precision on GPU platforms, plus deterministic forces on CUDA.
pub fn platform_properties(platform: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    let platform = platform.to_ascii_uppercase();
    if platform == "CUDA" || platform == "OPENCL" {
        properties.insert("Precision".to_string(), "mixed".to_string());
    }
    if platform == "CUDA" {
        properties.insert("DeterministicForces".to_string(), "true".to_string());
    }
    properties
}

pub trait HybridFactoryBuilder {
    /// Builds the hybrid system of every configured phase, plus the ligand atom map.
    fn build(&self, config: &SetupConfig) -> Result<HybridSetup, BackendError>;
}

pub trait StructureRelaxer {
    /// Minimizes `system`, runs thermostatted dynamics and returns the final state.
    fn relax(
        &self,
        system: &HybridSystem,
        request: &RelaxationRequest,
    ) -> Result<RelaxedState, BackendError>;
}

pub trait AtomMapRenderer {
    /// Draws the two ligands with mapped atoms highlighted into an image at `output`.
    fn render(&self, atom_map: &LigandAtomMap, output: &Path) -> Result<(), BackendError>;
}

/// All collaborators needed by the setup workflow.
pub trait Collaborators: HybridFactoryBuilder + StructureRelaxer + AtomMapRenderer {}

impl<T: HybridFactoryBuilder + StructureRelaxer + AtomMapRenderer> Collaborators for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::tests::minimal_builder;

    #[test]
    fn gpu_platforms_request_mixed_precision() {
        let cuda = platform_properties("CUDA");
        assert_eq!(cuda.get("Precision").map(String::as_str), Some("mixed"));
        assert_eq!(
            cuda.get("DeterministicForces").map(String::as_str),
            Some("true")
        );

        let opencl = platform_properties("OpenCL");
        assert_eq!(opencl.len(), 1);
        assert!(platform_properties("CPU").is_empty());
    }

    #[test]
    fn relaxation_request_mirrors_configuration() {
        let config = minimal_builder().platform("CUDA").build().unwrap();
        let request = RelaxationRequest::from_config(&config);
        assert_eq!(request.iterations, 1000);
        assert_eq!(request.steps_per_iteration, 250);
        assert_eq!(request.collision_rate_per_ps, 90.0);
        assert_eq!(request.splitting, "V R O R V");
        assert_eq!(request.platform_properties.len(), 2);
    }
}

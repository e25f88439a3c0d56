use crate::error::{CliError, Result};
use fahsetup::engine::config::{MapStrength, Phase};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project ids are usually numeric but are used as directory names.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum FileProjectId {
    Number(u64),
    Name(String),
}

impl fmt::Display for FileProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileProjectId::Number(n) => write!(f, "{}", n),
            FileProjectId::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileLigandsConfig {
    pub file: Option<PathBuf>,
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileProjectsConfig {
    pub complex: Option<FileProjectId>,
    pub solvent: Option<FileProjectId>,
    pub vacuum: Option<FileProjectId>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSystemConfig {
    pub protein_pdb: Option<PathBuf>,
    pub receptor_mol2: Option<PathBuf>,
    pub forcefield_files: Option<Vec<String>>,
    pub small_molecule_forcefield: Option<String>,
    pub small_molecule_parameters_cache: Option<PathBuf>,
    pub complex_box_dimensions: Option<[f64; 3]>,
    pub solvent_box_dimensions: Option<[f64; 3]>,
    /// Angstroms.
    pub solvent_padding: Option<f64>,
    pub nonbonded_method: Option<String>,
    /// Atmospheres.
    pub pressure: Option<f64>,
    /// Kelvin.
    pub temperature: Option<f64>,
    pub spectators: Option<Vec<PathBuf>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileMappingConfig {
    pub atom_expression: Option<Vec<String>>,
    pub bond_expression: Option<Vec<String>>,
    pub map_strength: Option<MapStrength>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileAlchemyConfig {
    pub neglect_angles: Option<bool>,
    pub softcore_v2: Option<bool>,
    /// Overrides of the default alchemical function table, keyed by parameter name.
    pub functions: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRelaxationConfig {
    pub iterations: Option<u64>,
    pub steps_per_iteration: Option<u64>,
    /// Femtoseconds.
    pub timestep: Option<f64>,
    /// Inverse picoseconds.
    pub collision_rate: Option<f64>,
    pub platform: Option<String>,
    pub splitting: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileProductionConfig {
    pub nsteps_eq: Option<u64>,
    pub nsteps_neq: Option<u64>,
    /// Femtoseconds.
    pub timestep: Option<f64>,
    pub splitting: Option<String>,
    /// Inverse picoseconds.
    pub collision_rate: Option<f64>,
    pub constraint_tolerance: Option<f64>,
    pub measure_shadow_work: Option<bool>,
    pub n_cycles: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileBackendConfig {
    pub command: Option<PathBuf>,
    pub args: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub trajectory_directory: Option<String>,
    pub phases: Option<Vec<Phase>>,
    pub ligands: Option<FileLigandsConfig>,
    pub projects: Option<FileProjectsConfig>,
    pub system: Option<FileSystemConfig>,
    pub mapping: Option<FileMappingConfig>,
    pub alchemy: Option<FileAlchemyConfig>,
    pub relaxation: Option<FileRelaxationConfig>,
    pub production: Option<FileProductionConfig>,
    pub backend: Option<FileBackendConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading setup file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

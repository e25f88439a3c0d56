use crate::core::protocol::functions::AlchemicalFunctions;
use crate::core::protocol::nonequilibrium::NonequilibriumProtocol;
use crate::core::protocol::splitting::{Splitting, SplittingError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub use crate::core::models::phase::Phase;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    Invalid {
        parameter: &'static str,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            parameter,
            reason: reason.into(),
        }
    }
}

/// Name of the project directory used for the vacuum phase when none is given.
pub const DEFAULT_VACUUM_PROJECT: &str = "VACUUM";

/// Project directory names, one per phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectIds {
    pub complex: String,
    pub solvent: String,
    pub vacuum: String,
}

impl ProjectIds {
    pub fn get(&self, phase: Phase) -> &str {
        match phase {
            Phase::Complex => &self.complex,
            Phase::Solvent => &self.solvent,
            Phase::Vacuum => &self.vacuum,
        }
    }
}

/// Which two molecules of the ligand file form the transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LigandSelection {
    pub file: PathBuf,
    pub old_index: usize,
    pub new_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemConfig {
    pub protein_pdb: Option<PathBuf>,
    pub receptor_mol2: Option<PathBuf>,
    pub forcefield_files: Vec<String>,
    pub small_molecule_forcefield: String,
    pub small_molecule_parameters_cache: Option<PathBuf>,
    /// Box edge lengths of the complex phase in nanometers.
    pub complex_box_dimensions: [f64; 3],
    /// Box edge lengths of the solvent phase in nanometers.
    pub solvent_box_dimensions: [f64; 3],
    pub solvent_padding_angstroms: f64,
    pub nonbonded_method: String,
    pub pressure_atm: f64,
    pub temperature_kelvin: f64,
    /// Structures of non-alchemical molecules present in the complex.
    pub spectators: Vec<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            protein_pdb: None,
            receptor_mol2: None,
            forcefield_files: Vec::new(),
            small_molecule_forcefield: "openff-1.0.0".to_string(),
            small_molecule_parameters_cache: None,
            complex_box_dimensions: [9.8; 3],
            solvent_box_dimensions: [3.5; 3],
            solvent_padding_angstroms: 9.0,
            nonbonded_method: "PME".to_string(),
            pressure_atm: 1.0,
            temperature_kelvin: 300.0,
            spectators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapStrength {
    Weak,
    Default,
    Strong,
}

impl fmt::Display for MapStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MapStrength::Weak => "weak",
            MapStrength::Default => "default",
            MapStrength::Strong => "strong",
        })
    }
}

impl FromStr for MapStrength {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weak" => Ok(MapStrength::Weak),
            "default" => Ok(MapStrength::Default),
            "strong" => Ok(MapStrength::Strong),
            other => Err(ConfigError::invalid(
                "map_strength",
                format!("'{}' is not one of weak, default, strong", other),
            )),
        }
    }
}

/// Atom-mapping criteria forwarded to the hybrid factory.
///
/// When `map_strength` is set the expressions are ignored by the mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingConfig {
    pub atom_expression: Vec<String>,
    pub bond_expression: Vec<String>,
    pub map_strength: Option<MapStrength>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            atom_expression: vec!["IntType".to_string()],
            bond_expression: vec!["DefaultBonds".to_string()],
            map_strength: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlchemyConfig {
    pub neglect_angles: bool,
    pub softcore_v2: bool,
    /// Always `false` for distributed runs.
    pub anneal_14s: bool,
    pub functions: AlchemicalFunctions,
}

impl Default for AlchemyConfig {
    fn default() -> Self {
        Self {
            neglect_angles: false,
            softcore_v2: false,
            anneal_14s: false,
            functions: AlchemicalFunctions::default(),
        }
    }
}

/// Parameters of the relaxation (minimization and thermostatted dynamics) run
/// before the state is captured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaxationConfig {
    pub iterations: u64,
    pub steps_per_iteration: u64,
    pub timestep_fs: f64,
    pub collision_rate_per_ps: f64,
    pub platform: String,
    pub splitting: Splitting,
}

impl RelaxationConfig {
    pub fn total_steps(&self) -> u64 {
        self.iterations * self.steps_per_iteration
    }
}

/// Parameters of the periodic nonequilibrium protocol run by the distributed client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionConfig {
    pub nsteps_eq: u64,
    pub nsteps_neq: u64,
    pub timestep_fs: f64,
    pub splitting: Splitting,
    pub collision_rate_per_ps: f64,
    pub constraint_tolerance: f64,
    pub measure_shadow_work: bool,
    pub n_cycles: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupConfig {
    pub ligands: LigandSelection,
    pub projects: ProjectIds,
    pub trajectory_directory: String,
    pub phases: Vec<Phase>,
    pub system: SystemConfig,
    pub mapping: MappingConfig,
    pub alchemy: AlchemyConfig,
    pub relaxation: RelaxationConfig,
    pub production: ProductionConfig,
}

impl SetupConfig {
    /// The production protocol at the system temperature with the configured functions.
    pub fn protocol(&self) -> NonequilibriumProtocol {
        NonequilibriumProtocol {
            nsteps_eq: self.production.nsteps_eq,
            nsteps_neq: self.production.nsteps_neq,
            n_cycles: self.production.n_cycles,
            timestep_fs: self.production.timestep_fs,
            temperature_kelvin: self.system.temperature_kelvin,
            collision_rate_per_ps: self.production.collision_rate_per_ps,
            constraint_tolerance: self.production.constraint_tolerance,
            measure_shadow_work: self.production.measure_shadow_work,
            splitting: self.production.splitting.clone(),
            functions: self.alchemy.functions.clone(),
        }
    }
}

#[derive(Default)]
pub struct SetupConfigBuilder {
    ligand_file: Option<PathBuf>,
    old_ligand_index: Option<usize>,
    new_ligand_index: Option<usize>,
    complex_project: Option<String>,
    solvent_project: Option<String>,
    vacuum_project: Option<String>,
    trajectory_directory: Option<String>,
    phases: Option<Vec<Phase>>,
    system: SystemConfig,
    mapping: MappingConfig,
    alchemy: AlchemyConfig,
    relaxation_iterations: Option<u64>,
    relaxation_steps_per_iteration: Option<u64>,
    relaxation_timestep_fs: Option<f64>,
    relaxation_collision_rate: Option<f64>,
    platform: Option<String>,
    relaxation_splitting: Option<String>,
    nsteps_eq: Option<u64>,
    nsteps_neq: Option<u64>,
    timestep_fs: Option<f64>,
    production_splitting: Option<String>,
    collision_rate: Option<f64>,
    constraint_tolerance: Option<f64>,
    measure_shadow_work: Option<bool>,
    n_cycles: Option<u64>,
}

impl SetupConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ligand_file(mut self, path: PathBuf) -> Self {
        self.ligand_file = Some(path);
        self
    }
    pub fn old_ligand_index(mut self, index: usize) -> Self {
        self.old_ligand_index = Some(index);
        self
    }
    pub fn new_ligand_index(mut self, index: usize) -> Self {
        self.new_ligand_index = Some(index);
        self
    }
    pub fn complex_project(mut self, id: impl Into<String>) -> Self {
        self.complex_project = Some(id.into());
        self
    }
    pub fn solvent_project(mut self, id: impl Into<String>) -> Self {
        self.solvent_project = Some(id.into());
        self
    }
    pub fn vacuum_project(mut self, id: impl Into<String>) -> Self {
        self.vacuum_project = Some(id.into());
        self
    }
    pub fn trajectory_directory(mut self, name: impl Into<String>) -> Self {
        self.trajectory_directory = Some(name.into());
        self
    }
    pub fn phases(mut self, phases: Vec<Phase>) -> Self {
        self.phases = Some(phases);
        self
    }
    pub fn system(mut self, system: SystemConfig) -> Self {
        self.system = system;
        self
    }
    pub fn mapping(mut self, mapping: MappingConfig) -> Self {
        self.mapping = mapping;
        self
    }
    pub fn alchemy(mut self, alchemy: AlchemyConfig) -> Self {
        self.alchemy = alchemy;
        self
    }
    pub fn relaxation_iterations(mut self, n: u64) -> Self {
        self.relaxation_iterations = Some(n);
        self
    }
    pub fn relaxation_steps_per_iteration(mut self, n: u64) -> Self {
        self.relaxation_steps_per_iteration = Some(n);
        self
    }
    pub fn relaxation_timestep_fs(mut self, fs: f64) -> Self {
        self.relaxation_timestep_fs = Some(fs);
        self
    }
    pub fn relaxation_collision_rate(mut self, per_ps: f64) -> Self {
        self.relaxation_collision_rate = Some(per_ps);
        self
    }
    pub fn platform(mut self, name: impl Into<String>) -> Self {
        self.platform = Some(name.into());
        self
    }
    pub fn relaxation_splitting(mut self, splitting: impl Into<String>) -> Self {
        self.relaxation_splitting = Some(splitting.into());
        self
    }
    pub fn nsteps_eq(mut self, n: u64) -> Self {
        self.nsteps_eq = Some(n);
        self
    }
    pub fn nsteps_neq(mut self, n: u64) -> Self {
        self.nsteps_neq = Some(n);
        self
    }
    pub fn timestep_fs(mut self, fs: f64) -> Self {
        self.timestep_fs = Some(fs);
        self
    }
    pub fn production_splitting(mut self, splitting: impl Into<String>) -> Self {
        self.production_splitting = Some(splitting.into());
        self
    }
    pub fn collision_rate(mut self, per_ps: f64) -> Self {
        self.collision_rate = Some(per_ps);
        self
    }
    pub fn constraint_tolerance(mut self, tolerance: f64) -> Self {
        self.constraint_tolerance = Some(tolerance);
        self
    }
    pub fn measure_shadow_work(mut self, enabled: bool) -> Self {
        self.measure_shadow_work = Some(enabled);
        self
    }
    pub fn n_cycles(mut self, n: u64) -> Self {
        self.n_cycles = Some(n);
        self
    }

    pub fn build(self) -> Result<SetupConfig, ConfigError> {
        let ligands = LigandSelection {
            file: self
                .ligand_file
                .ok_or(ConfigError::MissingParameter("ligand_file"))?,
            old_index: self
                .old_ligand_index
                .ok_or(ConfigError::MissingParameter("old_ligand_index"))?,
            new_index: self
                .new_ligand_index
                .ok_or(ConfigError::MissingParameter("new_ligand_index"))?,
        };
        if ligands.old_index == ligands.new_index {
            return Err(ConfigError::invalid(
                "new_ligand_index",
                format!("old and new ligand are both index {}", ligands.old_index),
            ));
        }

        let projects = ProjectIds {
            complex: self
                .complex_project
                .ok_or(ConfigError::MissingParameter("complex_projid"))?,
            solvent: self
                .solvent_project
                .ok_or(ConfigError::MissingParameter("solvent_projid"))?,
            vacuum: self
                .vacuum_project
                .unwrap_or_else(|| DEFAULT_VACUUM_PROJECT.to_string()),
        };
        for phase in Phase::ALL {
            check_path_component("projid", projects.get(phase))?;
        }

        let trajectory_directory = self
            .trajectory_directory
            .ok_or(ConfigError::MissingParameter("trajectory_directory"))?;
        check_path_component("trajectory_directory", &trajectory_directory)?;

        let phases = dedup_phases(self.phases.unwrap_or_else(|| Phase::ALL.to_vec()));
        if phases.is_empty() {
            return Err(ConfigError::invalid("phases", "at least one phase is required"));
        }
        for (i, &phase) in phases.iter().enumerate() {
            let id = projects.get(phase);
            if let Some(&earlier) = phases[..i].iter().find(|&&p| projects.get(p) == id) {
                return Err(ConfigError::invalid(
                    "projid",
                    format!("phases '{}' and '{}' share project '{}'", earlier, phase, id),
                ));
            }
        }

        let system = self.system;
        if system.forcefield_files.is_empty() {
            return Err(ConfigError::MissingParameter("forcefield_files"));
        }
        check_positive("temperature", system.temperature_kelvin)?;
        if phases.contains(&Phase::Complex)
            && system.protein_pdb.is_none()
            && system.receptor_mol2.is_none()
        {
            return Err(ConfigError::invalid(
                "phases",
                "the complex phase needs either protein_pdb or receptor_mol2",
            ));
        }

        let relaxation = RelaxationConfig {
            iterations: self.relaxation_iterations.unwrap_or(1000),
            steps_per_iteration: self.relaxation_steps_per_iteration.unwrap_or(250),
            timestep_fs: check_positive(
                "relaxation_timestep",
                self.relaxation_timestep_fs.unwrap_or(2.0),
            )?,
            collision_rate_per_ps: check_non_negative(
                "relaxation_collision_rate",
                self.relaxation_collision_rate.unwrap_or(90.0),
            )?,
            platform: self.platform.unwrap_or_else(|| "OpenCL".to_string()),
            splitting: parse_splitting(
                "eq_splitting",
                self.relaxation_splitting.as_deref().unwrap_or("V R O R V"),
                Splitting::equilibrium,
            )?,
        };

        let production = ProductionConfig {
            nsteps_eq: self.nsteps_eq.unwrap_or(250_000),
            nsteps_neq: self.nsteps_neq.unwrap_or(250_000),
            timestep_fs: check_positive("timestep", self.timestep_fs.unwrap_or(4.0))?,
            splitting: parse_splitting(
                "neq_splitting",
                self.production_splitting.as_deref().unwrap_or("V R H O R V"),
                Splitting::nonequilibrium,
            )?,
            collision_rate_per_ps: check_non_negative(
                "collision_rate",
                self.collision_rate.unwrap_or(1.0),
            )?,
            constraint_tolerance: check_positive(
                "constraint_tolerance",
                self.constraint_tolerance.unwrap_or(1e-6),
            )?,
            measure_shadow_work: self.measure_shadow_work.unwrap_or(false),
            n_cycles: self.n_cycles.unwrap_or(1),
        };
        if production.nsteps_neq == 0 {
            return Err(ConfigError::invalid("nsteps_neq", "must be at least 1"));
        }
        if production.n_cycles == 0 {
            return Err(ConfigError::invalid("n_cycles", "must be at least 1"));
        }

        let mut alchemy = self.alchemy;
        alchemy.anneal_14s = false;

        Ok(SetupConfig {
            ligands,
            projects,
            trajectory_directory,
            phases,
            system,
            mapping: self.mapping,
            alchemy,
            relaxation,
            production,
        })
    }
}

fn dedup_phases(phases: Vec<Phase>) -> Vec<Phase> {
    let mut unique = Vec::with_capacity(phases.len());
    for phase in phases {
        if !unique.contains(&phase) {
            unique.push(phase);
        }
    }
    unique
}

fn check_positive(parameter: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::invalid(
            parameter,
            format!("must be positive, got {}", value),
        ))
    }
}

fn check_non_negative(parameter: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::invalid(
            parameter,
            format!("must be zero or positive, got {}", value),
        ))
    }
}

fn check_path_component(parameter: &'static str, name: &str) -> Result<(), ConfigError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(ConfigError::invalid(
            parameter,
            format!("'{}' must be a single directory name", name),
        )),
    }
}

fn parse_splitting(
    parameter: &'static str,
    splitting: &str,
    parse: fn(&str) -> Result<Splitting, SplittingError>,
) -> Result<Splitting, ConfigError> {
    parse(splitting).map_err(|e| ConfigError::invalid(parameter, e.to_string()))
}

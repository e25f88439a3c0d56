use super::defaults::DefaultsConfig;
use super::file::{
    FileAlchemyConfig, FileConfig, FileMappingConfig, FileProjectId, FileSystemConfig,
};
use super::models::{AppConfig, BackendCommand};
use crate::cli::{ConfigArgs, SetupOverrides};
use crate::error::{CliError, Result};
use fahsetup::engine::config::{
    self as core_config, AlchemyConfig, MappingConfig, SetupConfigBuilder, SystemConfig,
};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

const FUNCTION_KEY_PREFIX: &str = "alchemy.functions.";

pub fn build_config(config_args: &ConfigArgs, overrides: &SetupOverrides) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = FileConfig::from_file(&config_args.config)?;
    let mut file_config = apply_set_values(file_config, &config_args.set_values)?;

    let ligands = file_config.ligands.take().unwrap_or_default();
    let projects = file_config.projects.take().unwrap_or_default();
    let relaxation = file_config.relaxation.take().unwrap_or_default();
    let production = file_config.production.take().unwrap_or_default();
    let backend_file = file_config.backend.take().unwrap_or_default();

    let phases = if overrides.phases.is_empty() {
        file_config.phases.take()
    } else {
        Some(overrides.phases.clone())
    };

    let system = merge_system(file_config.system.take(), &defaults);
    let mapping = merge_mapping(file_config.mapping.take(), &defaults);
    let alchemy = merge_alchemy(file_config.alchemy.take(), &defaults)?;

    let builder = SetupConfigBuilder::new()
        .system(system)
        .mapping(mapping)
        .alchemy(alchemy)
        .maybe(ligands.file, SetupConfigBuilder::ligand_file)
        .maybe(
            overrides.old_ligand.or(ligands.old_index),
            SetupConfigBuilder::old_ligand_index,
        )
        .maybe(
            overrides.new_ligand.or(ligands.new_index),
            SetupConfigBuilder::new_ligand_index,
        )
        .maybe(projects.complex, |b, id| b.complex_project(id.to_string()))
        .maybe(projects.solvent, |b, id| b.solvent_project(id.to_string()))
        .maybe(projects.vacuum, |b, id| b.vacuum_project(id.to_string()))
        .maybe(
            overrides
                .trajectory_directory
                .clone()
                .or(file_config.trajectory_directory.take()),
            |b, name| b.trajectory_directory(name),
        )
        .maybe(phases, SetupConfigBuilder::phases)
        .maybe(
            relaxation.iterations,
            SetupConfigBuilder::relaxation_iterations,
        )
        .maybe(
            relaxation.steps_per_iteration,
            SetupConfigBuilder::relaxation_steps_per_iteration,
        )
        .maybe(
            relaxation.timestep,
            SetupConfigBuilder::relaxation_timestep_fs,
        )
        .maybe(
            relaxation.collision_rate,
            SetupConfigBuilder::relaxation_collision_rate,
        )
        .maybe(relaxation.platform, |b, name| b.platform(name))
        .maybe(relaxation.splitting, |b, s| b.relaxation_splitting(s))
        .maybe(production.nsteps_eq, SetupConfigBuilder::nsteps_eq)
        .maybe(production.nsteps_neq, SetupConfigBuilder::nsteps_neq)
        .maybe(production.timestep, SetupConfigBuilder::timestep_fs)
        .maybe(production.splitting, |b, s| b.production_splitting(s))
        .maybe(production.collision_rate, SetupConfigBuilder::collision_rate)
        .maybe(
            production.constraint_tolerance,
            SetupConfigBuilder::constraint_tolerance,
        )
        .maybe(
            production.measure_shadow_work,
            SetupConfigBuilder::measure_shadow_work,
        )
        .maybe(production.n_cycles, SetupConfigBuilder::n_cycles);

    let core_config = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let backend = BackendCommand {
        program: overrides
            .backend
            .clone()
            .or(backend_file.command)
            .unwrap_or_else(|| PathBuf::from(&defaults.backend_command)),
        args: if overrides.backend_args.is_empty() {
            backend_file.args.unwrap_or_default()
        } else {
            overrides.backend_args.clone()
        },
    };
    debug!(program = %backend.program.display(), "Resolved collaborator command.");

    Ok(AppConfig {
        backend,
        core_config,
    })
}

/// Applies a setter only when a value was provided, leaving the builder default otherwise.
trait MaybeSet: Sized {
    fn maybe<T>(self, value: Option<T>, set: impl FnOnce(Self, T) -> Self) -> Self {
        match value {
            Some(value) => set(self, value),
            None => self,
        }
    }
}

impl MaybeSet for SetupConfigBuilder {}

fn merge_system(file_val: Option<FileSystemConfig>, defaults: &DefaultsConfig) -> SystemConfig {
    let file_val = file_val.unwrap_or_default();
    let base = &defaults.system;
    SystemConfig {
        protein_pdb: file_val.protein_pdb.or_else(|| base.protein_pdb.clone()),
        receptor_mol2: file_val.receptor_mol2.or_else(|| base.receptor_mol2.clone()),
        forcefield_files: file_val
            .forcefield_files
            .unwrap_or_else(|| base.forcefield_files.clone()),
        small_molecule_forcefield: file_val
            .small_molecule_forcefield
            .unwrap_or_else(|| base.small_molecule_forcefield.clone()),
        small_molecule_parameters_cache: file_val
            .small_molecule_parameters_cache
            .or_else(|| base.small_molecule_parameters_cache.clone()),
        complex_box_dimensions: file_val
            .complex_box_dimensions
            .unwrap_or(base.complex_box_dimensions),
        solvent_box_dimensions: file_val
            .solvent_box_dimensions
            .unwrap_or(base.solvent_box_dimensions),
        solvent_padding_angstroms: file_val
            .solvent_padding
            .unwrap_or(base.solvent_padding_angstroms),
        nonbonded_method: file_val
            .nonbonded_method
            .unwrap_or_else(|| base.nonbonded_method.clone()),
        pressure_atm: file_val.pressure.unwrap_or(base.pressure_atm),
        temperature_kelvin: file_val.temperature.unwrap_or(base.temperature_kelvin),
        spectators: file_val
            .spectators
            .unwrap_or_else(|| base.spectators.clone()),
    }
}

fn merge_mapping(file_val: Option<FileMappingConfig>, defaults: &DefaultsConfig) -> MappingConfig {
    let file_val = file_val.unwrap_or_default();
    MappingConfig {
        atom_expression: file_val
            .atom_expression
            .unwrap_or_else(|| defaults.mapping.atom_expression.clone()),
        bond_expression: file_val
            .bond_expression
            .unwrap_or_else(|| defaults.mapping.bond_expression.clone()),
        map_strength: file_val.map_strength.or(defaults.mapping.map_strength),
    }
}

fn merge_alchemy(
    file_val: Option<FileAlchemyConfig>,
    defaults: &DefaultsConfig,
) -> Result<AlchemyConfig> {
    let file_val = file_val.unwrap_or_default();
    let overrides = file_val.functions.unwrap_or_default();
    let functions = defaults
        .functions
        .with_overrides(
            overrides
                .iter()
                .map(|(name, expression)| (name.as_str(), expression.as_str())),
        )
        .map_err(|e| CliError::Config(format!("Invalid alchemical function: {}", e)))?;

    Ok(AlchemyConfig {
        neglect_angles: file_val.neglect_angles.unwrap_or(false),
        softcore_v2: file_val.softcore_v2.unwrap_or(false),
        anneal_14s: false,
        functions,
    })
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value))
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    if set_values.is_empty() {
        return Ok(config);
    }
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();

        if let Some(name) = key.strip_prefix(FUNCTION_KEY_PREFIX) {
            config
                .alchemy
                .get_or_insert_with(Default::default)
                .functions
                .get_or_insert_with(Default::default)
                .insert(name.to_string(), value_str.to_string());
            continue;
        }

        match key {
            "trajectory-directory" => {
                config.trajectory_directory = Some(value_str.to_string());
            }
            "phases" => {
                let phases = value_str
                    .split(',')
                    .map(|p| parse_value::<core_config::Phase>(key, p, "phase"))
                    .collect::<Result<Vec<_>>>()?;
                config.phases = Some(phases);
            }
            "ligands.file" => {
                config.ligands.get_or_insert_with(Default::default).file =
                    Some(PathBuf::from(value_str));
            }
            "ligands.old-index" => {
                config.ligands.get_or_insert_with(Default::default).old_index =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "ligands.new-index" => {
                config.ligands.get_or_insert_with(Default::default).new_index =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "projects.complex" => {
                config.projects.get_or_insert_with(Default::default).complex =
                    Some(FileProjectId::Name(value_str.to_string()));
            }
            "projects.solvent" => {
                config.projects.get_or_insert_with(Default::default).solvent =
                    Some(FileProjectId::Name(value_str.to_string()));
            }
            "projects.vacuum" => {
                config.projects.get_or_insert_with(Default::default).vacuum =
                    Some(FileProjectId::Name(value_str.to_string()));
            }
            "system.temperature" => {
                config.system.get_or_insert_with(Default::default).temperature =
                    Some(parse_value(key, value_str, "float")?);
            }
            "system.pressure" => {
                config.system.get_or_insert_with(Default::default).pressure =
                    Some(parse_value(key, value_str, "float")?);
            }
            "system.solvent-padding" => {
                config
                    .system
                    .get_or_insert_with(Default::default)
                    .solvent_padding = Some(parse_value(key, value_str, "float")?);
            }
            "system.nonbonded-method" => {
                config
                    .system
                    .get_or_insert_with(Default::default)
                    .nonbonded_method = Some(value_str.to_string());
            }
            "system.small-molecule-forcefield" => {
                config
                    .system
                    .get_or_insert_with(Default::default)
                    .small_molecule_forcefield = Some(value_str.to_string());
            }
            "mapping.map-strength" => {
                config
                    .mapping
                    .get_or_insert_with(Default::default)
                    .map_strength = Some(
                    value_str
                        .parse()
                        .map_err(|e: core_config::ConfigError| CliError::Config(e.to_string()))?,
                );
            }
            "alchemy.neglect-angles" => {
                config
                    .alchemy
                    .get_or_insert_with(Default::default)
                    .neglect_angles = Some(parse_value(key, value_str, "boolean")?);
            }
            "alchemy.softcore-v2" => {
                config
                    .alchemy
                    .get_or_insert_with(Default::default)
                    .softcore_v2 = Some(parse_value(key, value_str, "boolean")?);
            }
            "relaxation.iterations" => {
                config
                    .relaxation
                    .get_or_insert_with(Default::default)
                    .iterations = Some(parse_value(key, value_str, "integer")?);
            }
            "relaxation.steps-per-iteration" => {
                config
                    .relaxation
                    .get_or_insert_with(Default::default)
                    .steps_per_iteration = Some(parse_value(key, value_str, "integer")?);
            }
            "relaxation.timestep" => {
                config
                    .relaxation
                    .get_or_insert_with(Default::default)
                    .timestep = Some(parse_value(key, value_str, "float")?);
            }
            "relaxation.collision-rate" => {
                config
                    .relaxation
                    .get_or_insert_with(Default::default)
                    .collision_rate = Some(parse_value(key, value_str, "float")?);
            }
            "relaxation.platform" => {
                config
                    .relaxation
                    .get_or_insert_with(Default::default)
                    .platform = Some(value_str.to_string());
            }
            "relaxation.splitting" => {
                config
                    .relaxation
                    .get_or_insert_with(Default::default)
                    .splitting = Some(value_str.to_string());
            }
            "production.nsteps-eq" => {
                config
                    .production
                    .get_or_insert_with(Default::default)
                    .nsteps_eq = Some(parse_value(key, value_str, "integer")?);
            }
            "production.nsteps-neq" => {
                config
                    .production
                    .get_or_insert_with(Default::default)
                    .nsteps_neq = Some(parse_value(key, value_str, "integer")?);
            }
            "production.timestep" => {
                config
                    .production
                    .get_or_insert_with(Default::default)
                    .timestep = Some(parse_value(key, value_str, "float")?);
            }
            "production.splitting" => {
                config
                    .production
                    .get_or_insert_with(Default::default)
                    .splitting = Some(value_str.to_string());
            }
            "production.collision-rate" => {
                config
                    .production
                    .get_or_insert_with(Default::default)
                    .collision_rate = Some(parse_value(key, value_str, "float")?);
            }
            "production.constraint-tolerance" => {
                config
                    .production
                    .get_or_insert_with(Default::default)
                    .constraint_tolerance = Some(parse_value(key, value_str, "float")?);
            }
            "production.measure-shadow-work" => {
                config
                    .production
                    .get_or_insert_with(Default::default)
                    .measure_shadow_work = Some(parse_value(key, value_str, "boolean")?);
            }
            "production.n-cycles" => {
                config
                    .production
                    .get_or_insert_with(Default::default)
                    .n_cycles = Some(parse_value(key, value_str, "integer")?);
            }
            "backend.command" => {
                config.backend.get_or_insert_with(Default::default).command =
                    Some(PathBuf::from(value_str));
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

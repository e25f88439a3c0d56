use crate::core::io::core_xml::CoreParameters;
use crate::core::io::hybrid::{references_record, topology_table, write_hybrid_npz};
use crate::core::io::openmm::{IntegratorXml, StateXml};
use crate::core::io::pdb::PdbFile;
use crate::core::io::traits::Artifact as _;
use crate::core::models::references::References;
use crate::core::models::state::RelaxedState;
use crate::core::models::system::HybridSystem;
use crate::core::models::topology::DEFAULT_RETAINED_IONS;
use crate::core::protocol::integrator::{CustomIntegrator, PeriodicNonequilibriumIntegrator};
use crate::core::protocol::nonequilibrium::NonequilibriumProtocol;
use crate::engine::backend::{Collaborators, HybridSetup, RelaxationRequest};
use crate::engine::config::{Phase, SetupConfig};
use crate::engine::error::EngineError;
use crate::engine::layout::{Artifact, RunLayout};
use crate::engine::progress::{Progress, ProgressReporter};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Number of artifacts written per phase, used to size progress tasks.
const ARTIFACTS_PER_PHASE: u64 = Artifact::ALL.len() as u64;

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub run_dir: PathBuf,
    pub relaxation_passed: bool,
    /// Why relaxation failed, when it did.
    pub relaxation_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupReport {
    pub phases: Vec<PhaseOutcome>,
}

impl SetupReport {
    pub fn all_relaxed(&self) -> bool {
        self.phases.iter().all(|p| p.relaxation_passed)
    }
}

/// The production protocol with everything derived from it.
#[derive(Debug, Clone)]
pub struct ProtocolPlan {
    pub protocol: NonequilibriumProtocol,
    pub integrator: CustomIntegrator,
    pub core: CoreParameters,
}

/// Computes the integrator definition and core parameters without touching the
/// collaborators or the file system.
pub fn plan(config: &SetupConfig) -> ProtocolPlan {
    let protocol = config.protocol();
    let integrator = PeriodicNonequilibriumIntegrator::build(&protocol);
    let core = CoreParameters::from_protocol(&protocol);
    ProtocolPlan {
        protocol,
        integrator,
        core,
    }
}

/// Runs the full setup: prepares the run directories, obtains the hybrid systems and
/// writes every artifact for each configured phase.
///
/// # Errors
///
/// Fails if a run directory already exists, a collaborator other than the relaxer
/// fails, a hybrid system is missing or invalid, or any artifact cannot be written.
/// A failed relaxation is not an error; see [`PhaseOutcome::relaxation_passed`].
#[instrument(skip_all, name = "setup_workflow", fields(run = %config.trajectory_directory))]
pub fn run(
    config: &SetupConfig,
    layout: &RunLayout,
    backend: &impl Collaborators,
    reporter: &ProgressReporter,
) -> Result<SetupReport, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Preparing run directories",
    });
    layout.prepare(&config.phases)?;
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Building hybrid systems",
    });
    info!(
        old = config.ligands.old_index,
        new = config.ligands.new_index,
        phases = config.phases.len(),
        "Requesting hybrid systems from the collaborator."
    );
    let setup = backend.build(config)?;
    for &phase in &config.phases {
        setup
            .system(phase)
            .ok_or(EngineError::MissingPhase(phase))?
            .validate()?;
    }
    reporter.report(Progress::PhaseFinish);

    let plan = plan(config);
    let request = RelaxationRequest::from_config(config);
    let mut report = SetupReport::default();

    for &phase in &config.phases {
        reporter.report(Progress::PhaseStart {
            name: phase.as_str(),
        });
        reporter.report(Progress::TaskStart {
            total_steps: ARTIFACTS_PER_PHASE,
        });
        let outcome = write_phase(phase, config, layout, backend, &setup, &plan, &request, reporter)?;
        reporter.report(Progress::TaskFinish);
        reporter.report(Progress::PhaseFinish);
        report.phases.push(outcome);
    }

    info!(
        phases = report.phases.len(),
        all_relaxed = report.all_relaxed(),
        "Setup complete."
    );
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn write_phase(
    phase: Phase,
    config: &SetupConfig,
    layout: &RunLayout,
    backend: &impl Collaborators,
    setup: &HybridSetup,
    plan: &ProtocolPlan,
    request: &RelaxationRequest,
    reporter: &ProgressReporter,
) -> Result<PhaseOutcome, EngineError> {
    let system = setup
        .system(phase)
        .ok_or(EngineError::MissingPhase(phase))?;
    let run_dir = layout.run_dir(phase);
    info!(phase = %phase, path = %run_dir.display(), "Writing phase artifacts.");
    let step = || reporter.report(Progress::TaskIncrement);

    let path = layout.artifact(phase, Artifact::HybridArrays);
    write_hybrid_npz(&path, system).map_err(|source| EngineError::Array {
        path: path.clone(),
        source,
    })?;
    step();

    let path = layout.artifact(phase, Artifact::System);
    fs::write(&path, &system.system_xml).map_err(|e| EngineError::io(&path, e))?;
    step();

    let path = layout.artifact(phase, Artifact::Integrator);
    IntegratorXml(&plan.integrator)
        .write_to_path(&path)
        .map_err(|e| EngineError::io(&path, e))?;
    step();

    let (relaxed, relaxation_error) = match relax(backend, system, request) {
        Ok(state) => {
            let path = layout.artifact(phase, Artifact::State);
            StateXml(&state)
                .write_to_path(&path)
                .map_err(|e| EngineError::io(&path, e))?;
            (Some(state), None)
        }
        Err(message) => {
            warn!(phase = %phase, error = %message, "Structure relaxation failed; continuing with unrelaxed positions.");
            reporter.message(format!("Relaxation failed for {}: {}", phase, message));
            (None, Some(message))
        }
    };
    let passed = relaxed.is_some();
    step();

    let path = layout.artifact(phase, Artifact::HybridTopology);
    topology_table(&system.topology)
        .and_then(|table| table.write_to_path(&path))
        .map_err(|source| EngineError::Array {
            path: path.clone(),
            source,
        })?;
    step();

    let path = layout.artifact(phase, Artifact::StrippedStructure);
    write_stripped_structure(system, relaxed.as_ref(), &path)?;
    step();

    let path = layout.artifact(phase, Artifact::CoreConfig);
    plan.core
        .write_to_path(&path)
        .map_err(|e| EngineError::io(&path, e))?;
    step();

    let references = References {
        start_ligand: config.ligands.old_index,
        end_ligand: config.ligands.new_index,
        protein_pdb: config
            .system
            .protein_pdb
            .as_ref()
            .map(|p| p.display().to_string()),
        passed_structure_relax: passed,
    };
    let path = layout.artifact(phase, Artifact::References);
    references_record(&references)
        .and_then(|record| record.write_to_path(&path))
        .map_err(|source| EngineError::Array {
            path: path.clone(),
            source,
        })?;
    step();

    let path = layout.artifact(phase, Artifact::AtomMap);
    backend.render(&setup.atom_map, &path)?;
    step();

    debug!(phase = %phase, passed, "Phase artifacts written.");
    Ok(PhaseOutcome {
        phase,
        run_dir,
        relaxation_passed: passed,
        relaxation_error,
    })
}

/// Relaxes `system`, turning both collaborator errors and inconsistent states into a
/// failure message.
fn relax(
    backend: &impl Collaborators,
    system: &HybridSystem,
    request: &RelaxationRequest,
) -> Result<RelaxedState, String> {
    let state = backend.relax(system, request).map_err(|e| e.to_string())?;
    if !state.is_consistent_with(system.atom_count()) {
        return Err(format!(
            "relaxed state describes {} atoms, hybrid system has {}",
            state.atom_count(),
            system.atom_count()
        ));
    }
    if !state.is_finite() {
        return Err(format!(
            "relaxed state contains non-finite values (potential energy {})",
            state.potential_energy
        ));
    }
    Ok(state)
}

/// Writes the solvent-free PDB snapshot, from the relaxed state when there is one.
fn write_stripped_structure(
    system: &HybridSystem,
    relaxed: Option<&RelaxedState>,
    path: &std::path::Path,
) -> Result<(), EngineError> {
    let (positions, box_vectors) = match relaxed {
        Some(state) => (&state.positions, state.box_vectors.as_ref()),
        None => (&system.positions, system.box_vectors.as_ref()),
    };
    let (retained, stripped) = system.topology.without_solvent(&DEFAULT_RETAINED_IONS);
    let kept: Vec<_> = retained.iter().map(|&i| positions[i]).collect();

    PdbFile::new(&stripped, &kept, box_vectors)
        .and_then(|pdb| pdb.write_to_path(path))
        .map_err(|source| EngineError::Structure {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::mapping::{LigandAtomMap, LigandRecord};
    use crate::core::models::system::tests::sample_system;
    use crate::engine::backend::{
        AtomMapRenderer, BackendError, HybridFactoryBuilder, StructureRelaxer,
    };
    use crate::engine::config::tests::minimal_builder;
    use nalgebra::{Point3, Vector3};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct MockBackend {
        phases: Vec<Phase>,
        failing_phase: Option<Phase>,
        non_finite_phase: Option<Phase>,
        relaxed: Mutex<Vec<Phase>>,
    }

    impl MockBackend {
        fn new(phases: &[Phase]) -> Self {
            Self {
                phases: phases.to_vec(),
                failing_phase: None,
                non_finite_phase: None,
                relaxed: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, phase: Phase) -> Self {
            self.failing_phase = Some(phase);
            self
        }

        fn exploding(mut self, phase: Phase) -> Self {
            self.non_finite_phase = Some(phase);
            self
        }
    }

    fn atom_map() -> LigandAtomMap {
        let record = |index, smiles: &str| LigandRecord {
            index,
            name: format!("lig{}", index),
            smiles: smiles.to_string(),
        };
        LigandAtomMap {
            old_ligand: record(0, "CCCl"),
            new_ligand: record(1, "CCF"),
            new_to_old: BTreeMap::from([(0, 0), (1, 1)]),
        }
    }

    impl HybridFactoryBuilder for MockBackend {
        fn build(&self, _config: &SetupConfig) -> Result<HybridSetup, BackendError> {
            Ok(HybridSetup {
                systems: self.phases.iter().map(|&p| sample_system(p)).collect(),
                atom_map: atom_map(),
            })
        }
    }

    impl StructureRelaxer for MockBackend {
        fn relax(
            &self,
            system: &HybridSystem,
            _request: &RelaxationRequest,
        ) -> Result<RelaxedState, BackendError> {
            self.relaxed.lock().unwrap().push(system.phase);
            if self.failing_phase == Some(system.phase) {
                return Err(BackendError::Remote("NaN during minimization".to_string()));
            }
            let n = system.atom_count();
            let mut state = RelaxedState {
                time_ps: 500.0,
                positions: system
                    .positions
                    .iter()
                    .map(|p| Point3::new(p.x + 0.5, p.y, p.z))
                    .collect(),
                velocities: vec![Vector3::zeros(); n],
                forces: vec![Vector3::zeros(); n],
                potential_energy: -42.0,
                kinetic_energy: 7.0,
                box_vectors: system.box_vectors,
                parameters: BTreeMap::from([("lambda_sterics_core".to_string(), 0.0)]),
            };
            if self.non_finite_phase == Some(system.phase) {
                state.positions[0] = Point3::new(f64::NAN, 0.0, 0.0);
                state.potential_energy = f64::NAN;
            }
            Ok(state)
        }
    }

    impl AtomMapRenderer for MockBackend {
        fn render(&self, _atom_map: &LigandAtomMap, output: &Path) -> Result<(), BackendError> {
            fs::write(output, b"\x89PNG\r\n\x1a\n")?;
            Ok(())
        }
    }

    fn layout_for(root: &Path, config: &SetupConfig) -> RunLayout {
        RunLayout::new(root, config.projects.clone(), &config.trajectory_directory)
    }

    #[test]
    fn every_phase_gets_the_complete_file_set() {
        let dir = tempdir().unwrap();
        let config = minimal_builder().build().unwrap();
        let layout = layout_for(dir.path(), &config);
        let backend = MockBackend::new(&Phase::ALL);

        let report = run(&config, &layout, &backend, &ProgressReporter::new()).unwrap();

        assert_eq!(report.phases.len(), 3);
        assert!(report.all_relaxed());
        for phase in Phase::ALL {
            assert!(
                layout.missing_artifacts(phase).is_empty(),
                "{} is missing {:?}",
                phase,
                layout.missing_artifacts(phase)
            );
        }
        assert_eq!(*backend.relaxed.lock().unwrap(), Phase::ALL.to_vec());
    }

    #[test]
    fn core_xml_reflects_the_production_protocol() {
        let dir = tempdir().unwrap();
        let config = minimal_builder()
            .phases(vec![Phase::Vacuum])
            .nsteps_eq(1000)
            .nsteps_neq(4000)
            .n_cycles(2)
            .build()
            .unwrap();
        let layout = layout_for(dir.path(), &config);
        run(
            &config,
            &layout,
            &MockBackend::new(&[Phase::Vacuum]),
            &ProgressReporter::new(),
        )
        .unwrap();

        let text = fs::read_to_string(layout.artifact(Phase::Vacuum, Artifact::CoreConfig)).unwrap();
        assert!(text.contains("<numSteps>20000</numSteps>"));
        assert!(text.contains("<xtcFreq>250000</xtcFreq>"));
        assert!(text.contains("<globalVarFreq>250</globalVarFreq>"));
    }

    #[test]
    fn existing_run_is_never_overwritten() {
        let dir = tempdir().unwrap();
        let config = minimal_builder().phases(vec![Phase::Solvent]).build().unwrap();
        let layout = layout_for(dir.path(), &config);
        let backend = MockBackend::new(&[Phase::Solvent]);
        run(&config, &layout, &backend, &ProgressReporter::new()).unwrap();

        let system_xml = layout.artifact(Phase::Solvent, Artifact::System);
        fs::write(&system_xml, "edited").unwrap();

        let err = run(&config, &layout, &backend, &ProgressReporter::new()).unwrap_err();
        assert!(matches!(err, EngineError::RunExists { .. }));
        assert_eq!(fs::read_to_string(system_xml).unwrap(), "edited");
    }

    #[test]
    fn failed_relaxation_is_recorded_and_skips_state() {
        let dir = tempdir().unwrap();
        let config = minimal_builder()
            .phases(vec![Phase::Solvent, Phase::Vacuum])
            .build()
            .unwrap();
        let layout = layout_for(dir.path(), &config);
        let backend = MockBackend::new(&[Phase::Solvent, Phase::Vacuum]).failing(Phase::Solvent);

        let report = run(&config, &layout, &backend, &ProgressReporter::new()).unwrap();

        let solvent = &report.phases[0];
        assert!(!solvent.relaxation_passed);
        assert!(
            solvent
                .relaxation_error
                .as_deref()
                .is_some_and(|m| m.contains("NaN"))
        );
        assert!(report.phases[1].relaxation_passed);
        assert_eq!(
            layout.missing_artifacts(Phase::Solvent),
            vec![Artifact::State]
        );
        assert!(layout.missing_artifacts(Phase::Vacuum).is_empty());

        let references = fs::read(layout.artifact(Phase::Solvent, Artifact::References)).unwrap();
        assert_eq!(references.last(), Some(&0));
        let references = fs::read(layout.artifact(Phase::Vacuum, Artifact::References)).unwrap();
        assert_eq!(references.last(), Some(&1));
    }

    #[test]
    fn non_finite_relaxed_state_counts_as_failure() {
        let dir = tempdir().unwrap();
        let config = minimal_builder().phases(vec![Phase::Solvent]).build().unwrap();
        let layout = layout_for(dir.path(), &config);
        let backend = MockBackend::new(&[Phase::Solvent]).exploding(Phase::Solvent);

        let report = run(&config, &layout, &backend, &ProgressReporter::new()).unwrap();

        let solvent = &report.phases[0];
        assert!(!solvent.relaxation_passed);
        assert!(
            solvent
                .relaxation_error
                .as_deref()
                .is_some_and(|m| m.contains("non-finite"))
        );
        assert_eq!(
            layout.missing_artifacts(Phase::Solvent),
            vec![Artifact::State]
        );
        let structure =
            fs::read_to_string(layout.artifact(Phase::Solvent, Artifact::StrippedStructure))
                .unwrap();
        assert!(!structure.contains("NaN"));
    }

    #[test]
    fn stripped_structure_uses_relaxed_or_original_positions() {
        let dir = tempdir().unwrap();
        let config = minimal_builder()
            .phases(vec![Phase::Solvent, Phase::Vacuum])
            .build()
            .unwrap();
        let layout = layout_for(dir.path(), &config);
        let backend = MockBackend::new(&[Phase::Solvent, Phase::Vacuum]).failing(Phase::Solvent);
        run(&config, &layout, &backend, &ProgressReporter::new()).unwrap();

        let unrelaxed =
            fs::read_to_string(layout.artifact(Phase::Solvent, Artifact::StrippedStructure))
                .unwrap();
        let relaxed =
            fs::read_to_string(layout.artifact(Phase::Vacuum, Artifact::StrippedStructure))
                .unwrap();

        // Water is removed; the four ligand atoms remain.
        assert_eq!(unrelaxed.matches("HETATM").count(), 4);
        assert!(!unrelaxed.contains("HOH"));
        assert!(unrelaxed.contains("CRYST1"));
        assert!(!relaxed.contains("CRYST1"));

        let first_x = |text: &str| -> f64 {
            let line = text.lines().find(|l| l.starts_with("HETATM")).unwrap();
            line[30..38].trim().parse().unwrap()
        };
        assert_eq!(first_x(&unrelaxed), 0.0);
        assert_eq!(first_x(&relaxed), 5.0);
    }

    #[test]
    fn missing_phase_from_builder_aborts() {
        let dir = tempdir().unwrap();
        let config = minimal_builder()
            .phases(vec![Phase::Solvent, Phase::Vacuum])
            .build()
            .unwrap();
        let layout = layout_for(dir.path(), &config);
        let err = run(
            &config,
            &layout,
            &MockBackend::new(&[Phase::Solvent]),
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::MissingPhase(Phase::Vacuum)));
    }

    #[test]
    fn progress_counts_every_artifact() {
        let dir = tempdir().unwrap();
        let config = minimal_builder().phases(vec![Phase::Vacuum]).build().unwrap();
        let layout = layout_for(dir.path(), &config);
        let increments = Mutex::new(0u64);
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::TaskIncrement = event {
                *increments.lock().unwrap() += 1;
            }
        }));

        run(&config, &layout, &MockBackend::new(&[Phase::Vacuum]), &reporter).unwrap();
        drop(reporter);
        assert_eq!(increments.into_inner().unwrap(), ARTIFACTS_PER_PHASE);
    }

    #[test]
    fn plan_derives_integrator_and_core_parameters() {
        let config = minimal_builder().build().unwrap();
        let plan = plan(&config);
        assert_eq!(plan.core.num_steps, 1_000_000);
        assert_eq!(plan.integrator.global_variable("n_steps_neq"), Some(250_000.0));
        assert!(plan.integrator.blocks_are_balanced());
    }
}

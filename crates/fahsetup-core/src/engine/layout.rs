use super::config::{Phase, ProjectIds};
use super::error::EngineError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const RUNS_DIR: &str = "RUNS";

/// Files written into every run directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    HybridArrays,
    System,
    Integrator,
    State,
    HybridTopology,
    StrippedStructure,
    CoreConfig,
    References,
    AtomMap,
}

impl Artifact {
    pub const ALL: [Artifact; 9] = [
        Artifact::HybridArrays,
        Artifact::System,
        Artifact::Integrator,
        Artifact::State,
        Artifact::HybridTopology,
        Artifact::StrippedStructure,
        Artifact::CoreConfig,
        Artifact::References,
        Artifact::AtomMap,
    ];

    pub fn file_name(self, phase: Phase) -> String {
        match self {
            Artifact::HybridArrays => "htf.npz".to_string(),
            Artifact::System => "system.xml".to_string(),
            Artifact::Integrator => "integrator.xml".to_string(),
            Artifact::State => "state.xml".to_string(),
            Artifact::HybridTopology => "hybrid_topology.npy".to_string(),
            Artifact::StrippedStructure => format!("hybrid_{}.pdb", phase),
            Artifact::CoreConfig => "core.xml".to_string(),
            Artifact::References => "references.npy".to_string(),
            Artifact::AtomMap => "atom_map.png".to_string(),
        }
    }
}

/// Directory convention `root/{projid}/RUNS/{trajectory_directory}` for each phase.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
    projects: ProjectIds,
    trajectory_directory: String,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>, projects: ProjectIds, trajectory_directory: &str) -> Self {
        Self {
            root: root.into(),
            projects,
            trajectory_directory: trajectory_directory.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_runs_dir(&self, phase: Phase) -> PathBuf {
        self.root.join(self.projects.get(phase)).join(RUNS_DIR)
    }

    pub fn run_dir(&self, phase: Phase) -> PathBuf {
        self.project_runs_dir(phase).join(&self.trajectory_directory)
    }

    pub fn artifact(&self, phase: Phase, artifact: Artifact) -> PathBuf {
        self.run_dir(phase).join(artifact.file_name(phase))
    }

    /// Creates the project directories (when absent) and a fresh run directory for
    /// every phase.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RunExists`] if any run directory is already present.
    /// That check happens for every phase before anything is created.
    pub fn prepare(&self, phases: &[Phase]) -> Result<(), EngineError> {
        for &phase in phases {
            let run_dir = self.run_dir(phase);
            if run_dir.exists() {
                return Err(EngineError::RunExists { path: run_dir });
            }
        }

        for &phase in phases {
            let runs = self.project_runs_dir(phase);
            fs::create_dir_all(&runs).map_err(|e| EngineError::io(&runs, e))?;

            let run_dir = self.run_dir(phase);
            match fs::create_dir(&run_dir) {
                Ok(()) => debug!(phase = %phase, path = %run_dir.display(), "Created run directory"),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    return Err(EngineError::RunExists { path: run_dir });
                }
                Err(e) => return Err(EngineError::io(run_dir, e)),
            }
        }
        Ok(())
    }

    /// Expected artifacts absent from the run directory of `phase`.
    pub fn missing_artifacts(&self, phase: Phase) -> Vec<Artifact> {
        Artifact::ALL
            .into_iter()
            .filter(|&artifact| !self.artifact(phase, artifact).is_file())
            .collect()
    }
}

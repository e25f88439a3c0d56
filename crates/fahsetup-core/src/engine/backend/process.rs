use super::{
    AtomMapRenderer, BackendError, HybridFactoryBuilder, HybridSetup, RelaxationRequest,
    StructureRelaxer,
};
use crate::core::models::atom::{AtomClass, HybridAtom};
use crate::core::models::mapping::{LigandAtomMap, LigandRecord};
use crate::core::models::state::RelaxedState;
use crate::core::models::system::{BoxVectors, HybridSystem};
use crate::core::models::topology::HybridTopology;
use crate::engine::config::{Phase, SetupConfig};
use nalgebra::{Point3, Vector3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, trace};

/// Runs an external program once per request.
///
/// The request is written to the program's stdin as a single JSON object carrying an
/// `operation` field (`build_hybrid`, `relax` or `render_atom_map`). The program must
/// print one JSON object to stdout and exit with status zero. A response of the form
/// `{"error": "..."}` is reported as [`BackendError::Remote`]. A `render_atom_map`
/// acknowledgement without an image at `output` is a [`BackendError::Protocol`].
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: PathBuf,
    args: Vec<String>,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    operation: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

impl ProcessBackend {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        operation: &'static str,
        body: &Req,
    ) -> Result<Resp, BackendError> {
        let payload = serde_json::to_vec(&Envelope { operation, body })?;
        debug!(
            program = %self.program.display(),
            operation,
            bytes = payload.len(),
            "Calling collaborator"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Protocol("collaborator stdin unavailable".into()))?;
        let writer = thread::spawn(move || stdin.write_all(&payload));

        let output = child.wait_with_output()?;
        match writer.join() {
            Ok(Ok(())) => {}
            // The collaborator may exit before reading all of its input.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(BackendError::Io(e)),
            Err(_) => {
                return Err(BackendError::Protocol(
                    "stdin writer thread panicked".into(),
                ));
            }
        }

        if !output.status.success() {
            return Err(BackendError::Status {
                operation,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        trace!(operation, bytes = output.stdout.len(), "Collaborator responded");

        let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            return Err(BackendError::Remote(message.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

type Vec3 = [f64; 3];

fn to_point(v: &Vec3) -> Point3<f64> {
    Point3::new(v[0], v[1], v[2])
}

fn to_vector(v: &Vec3) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

fn from_vector(v: &Vector3<f64>) -> Vec3 {
    [v.x, v.y, v.z]
}

fn to_box(b: &[Vec3; 3]) -> BoxVectors {
    [to_vector(&b[0]), to_vector(&b[1]), to_vector(&b[2])]
}

#[derive(Debug, Serialize, Deserialize)]
struct AtomWire {
    name: String,
    element: String,
    residue_name: String,
    residue_seq: i32,
    chain_id: String,
    #[serde(default)]
    segment_id: String,
}

#[derive(Debug, Deserialize)]
struct HybridSystemWire {
    phase: Phase,
    system_xml: String,
    atoms: Vec<AtomWire>,
    #[serde(default)]
    bonds: Vec<[usize; 2]>,
    positions: Vec<Vec3>,
    box_vectors: Option<[Vec3; 3]>,
    old_to_hybrid: Vec<[usize; 2]>,
    new_to_hybrid: Vec<[usize; 2]>,
    atom_classes: Vec<String>,
}

impl TryFrom<HybridSystemWire> for HybridSystem {
    type Error = BackendError;

    fn try_from(wire: HybridSystemWire) -> Result<Self, BackendError> {
        let mut topology = HybridTopology::new();
        for atom in wire.atoms {
            let chain_id = atom.chain_id.chars().next().unwrap_or(' ');
            let mut hybrid = HybridAtom::new(
                &atom.name,
                &atom.element,
                &atom.residue_name,
                atom.residue_seq,
            )
            .with_chain(chain_id);
            hybrid.segment_id = atom.segment_id;
            topology.add_atom(hybrid);
        }
        for [a, b] in wire.bonds {
            topology.add_bond(a, b).ok_or_else(|| {
                BackendError::Protocol(format!(
                    "bond {}-{} in phase '{}' references a missing atom",
                    a, b, wire.phase
                ))
            })?;
        }
        let atom_classes = wire
            .atom_classes
            .iter()
            .map(|c| c.parse::<AtomClass>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BackendError::Protocol(e.to_string()))?;

        Ok(HybridSystem {
            phase: wire.phase,
            system_xml: wire.system_xml,
            topology,
            positions: wire.positions.iter().map(to_point).collect(),
            box_vectors: wire.box_vectors.as_ref().map(to_box),
            old_to_hybrid: wire.old_to_hybrid.iter().map(|&[a, b]| (a, b)).collect(),
            new_to_hybrid: wire.new_to_hybrid.iter().map(|&[a, b]| (a, b)).collect(),
            atom_classes,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LigandWire {
    index: usize,
    #[serde(default)]
    name: String,
    smiles: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AtomMapWire {
    old_ligand: LigandWire,
    new_ligand: LigandWire,
    new_to_old: Vec<[usize; 2]>,
}

impl From<LigandWire> for LigandRecord {
    fn from(wire: LigandWire) -> Self {
        LigandRecord {
            index: wire.index,
            name: wire.name,
            smiles: wire.smiles,
        }
    }
}

impl From<&LigandRecord> for LigandWire {
    fn from(record: &LigandRecord) -> Self {
        LigandWire {
            index: record.index,
            name: record.name.clone(),
            smiles: record.smiles.clone(),
        }
    }
}

impl From<AtomMapWire> for LigandAtomMap {
    fn from(wire: AtomMapWire) -> Self {
        LigandAtomMap {
            old_ligand: wire.old_ligand.into(),
            new_ligand: wire.new_ligand.into(),
            new_to_old: wire.new_to_old.into_iter().map(|[n, o]| (n, o)).collect(),
        }
    }
}

impl From<&LigandAtomMap> for AtomMapWire {
    fn from(map: &LigandAtomMap) -> Self {
        AtomMapWire {
            old_ligand: (&map.old_ligand).into(),
            new_ligand: (&map.new_ligand).into(),
            new_to_old: map.new_to_old.iter().map(|(&n, &o)| [n, o]).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    systems: Vec<HybridSystemWire>,
    atom_map: AtomMapWire,
}

#[derive(Serialize)]
struct RelaxBody<'a> {
    phase: Phase,
    system_xml: &'a str,
    positions: Vec<Vec3>,
    box_vectors: Option<[Vec3; 3]>,
    request: &'a RelaxationRequest,
}

#[derive(Debug, Deserialize)]
struct StateWire {
    #[serde(default)]
    time_ps: f64,
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    forces: Vec<Vec3>,
    potential_energy: f64,
    kinetic_energy: f64,
    box_vectors: Option<[Vec3; 3]>,
    #[serde(default)]
    parameters: BTreeMap<String, f64>,
}

impl From<StateWire> for RelaxedState {
    fn from(wire: StateWire) -> Self {
        RelaxedState {
            time_ps: wire.time_ps,
            positions: wire.positions.iter().map(to_point).collect(),
            velocities: wire.velocities.iter().map(to_vector).collect(),
            forces: wire.forces.iter().map(to_vector).collect(),
            potential_energy: wire.potential_energy,
            kinetic_energy: wire.kinetic_energy,
            box_vectors: wire.box_vectors.as_ref().map(to_box),
            parameters: wire.parameters,
        }
    }
}

#[derive(Serialize)]
struct RenderBody<'a> {
    atom_map: AtomMapWire,
    output: &'a Path,
}

#[derive(Deserialize)]
struct Ack {}

impl HybridFactoryBuilder for ProcessBackend {
    fn build(&self, config: &SetupConfig) -> Result<HybridSetup, BackendError> {
        #[derive(Serialize)]
        struct BuildBody<'a> {
            config: &'a SetupConfig,
        }

        let response: BuildResponse = self.call("build_hybrid", &BuildBody { config })?;
        let systems = response
            .systems
            .into_iter()
            .map(HybridSystem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HybridSetup {
            systems,
            atom_map: response.atom_map.into(),
        })
    }
}

impl StructureRelaxer for ProcessBackend {
    fn relax(
        &self,
        system: &HybridSystem,
        request: &RelaxationRequest,
    ) -> Result<RelaxedState, BackendError> {
        let body = RelaxBody {
            phase: system.phase,
            system_xml: &system.system_xml,
            positions: system.positions.iter().map(|p| from_vector(&p.coords)).collect(),
            box_vectors: system
                .box_vectors
                .as_ref()
                .map(|b| [from_vector(&b[0]), from_vector(&b[1]), from_vector(&b[2])]),
            request,
        };
        let state: StateWire = self.call("relax", &body)?;
        let state = RelaxedState::from(state);
        if !state.is_consistent_with(system.atom_count()) {
            return Err(BackendError::Protocol(format!(
                "relaxed state has {} positions for a system of {} atoms",
                state.atom_count(),
                system.atom_count()
            )));
        }
        Ok(state)
    }
}

impl AtomMapRenderer for ProcessBackend {
    fn render(&self, atom_map: &LigandAtomMap, output: &Path) -> Result<(), BackendError> {
        let body = RenderBody {
            atom_map: atom_map.into(),
            output,
        };
        let _: Ack = self.call("render_atom_map", &body)?;
        if !output.is_file() {
            return Err(BackendError::Protocol(format!(
                "render_atom_map acknowledged but {} was not written",
                output.display()
            )));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::models::system::tests::sample_system;
    use crate::engine::config::tests::minimal_builder;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const STATE_JSON: &str = r#"{"time_ps": 500.0,
        "positions": [[0,0,0],[0.1,0,0],[0.2,0,0],[0.3,0,0],[1,1,1]],
        "velocities": [[0,0,0],[0,0,0],[0,0,0],[0,0,0],[0,0,0]],
        "forces": [[0,0,0],[0,0,0],[0,0,0],[0,0,0],[0,0,0]],
        "potential_energy": -10.5, "kinetic_energy": 3.25,
        "box_vectors": [[3.5,0,0],[0,3.5,0],[0,0,3.5]],
        "parameters": {"lambda_sterics_core": 0.0}}"#;

    const BUILD_JSON: &str = r#"{"systems": [{"phase": "vacuum", "system_xml": "<System/>",
        "atoms": [{"name": "C1", "element": "C", "residue_name": "MOL", "residue_seq": 1, "chain_id": "A"},
                  {"name": "H1", "element": "H", "residue_name": "MOL", "residue_seq": 1, "chain_id": "A"}],
        "bonds": [[0, 1]],
        "positions": [[0,0,0],[0.1,0,0]], "box_vectors": null,
        "old_to_hybrid": [[0,0],[1,1]], "new_to_hybrid": [[0,0]],
        "atom_classes": ["core", "unique_old"]}],
        "atom_map": {"old_ligand": {"index": 0, "smiles": "C"},
                     "new_ligand": {"index": 1, "smiles": "CO"},
                     "new_to_old": [[0, 0]]}}"#;

    /// Writes an executable script that answers every operation from a canned table.
    fn script(dir: &TempDir, body: &str) -> ProcessBackend {
        let path = dir.path().join("collaborator.sh");
        fs::write(&path, format!("#!/bin/sh\ninput=$(cat)\n{}\n", body)).unwrap();
        let mut permissions = fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).unwrap();
        ProcessBackend::new(path, Vec::new())
    }

    fn dispatching_backend(dir: &TempDir) -> ProcessBackend {
        let dispatch = format!(
            r#"case "$input" in
  *'"operation":"relax"'*) cat <<'EOF'
{}
EOF
  ;;
  *'"operation":"build_hybrid"'*) cat <<'EOF'
{}
EOF
  ;;
  *'"operation":"render_atom_map"'*)
    out=$(printf '%s' "$input" | sed -n 's/.*"output":"\([^"]*\)".*/\1/p')
    printf 'PNG' > "$out"
    echo '{{}}' ;;
  *) echo '{{"error": "unknown operation"}}' ;;
esac"#,
            STATE_JSON, BUILD_JSON
        );
        script(dir, &dispatch)
    }

    #[test]
    fn relax_parses_state_response() {
        let dir = TempDir::new().unwrap();
        let backend = dispatching_backend(&dir);
        let config = minimal_builder().build().unwrap();
        let system = sample_system(Phase::Solvent);

        let state = backend
            .relax(&system, &RelaxationRequest::from_config(&config))
            .unwrap();
        assert_eq!(state.atom_count(), 5);
        assert_eq!(state.potential_energy, -10.5);
        assert!(state.box_vectors.is_some());
        assert_eq!(state.parameters.get("lambda_sterics_core"), Some(&0.0));
    }

    #[test]
    fn build_converts_wire_systems() {
        let dir = TempDir::new().unwrap();
        let backend = dispatching_backend(&dir);
        let config = minimal_builder().build().unwrap();

        let setup = backend.build(&config).unwrap();
        let vacuum = setup.system(Phase::Vacuum).unwrap();
        assert_eq!(vacuum.atom_count(), 2);
        assert_eq!(vacuum.topology.bonds().len(), 1);
        assert_eq!(vacuum.atom_classes, vec![AtomClass::Core, AtomClass::UniqueOld]);
        assert!(vacuum.validate().is_ok());
        assert_eq!(setup.atom_map.new_ligand.smiles, "CO");
        assert_eq!(setup.atom_map.mapped_atom_count(), 1);
    }

    #[test]
    fn render_accepts_empty_acknowledgement() {
        let dir = TempDir::new().unwrap();
        let backend = dispatching_backend(&dir);
        let config = minimal_builder().build().unwrap();
        let setup = backend.build(&config).unwrap();
        let output = dir.path().join("atom_map.png");
        backend.render(&setup.atom_map, &output).unwrap();
        assert!(output.is_file());
    }

    #[test]
    fn render_without_image_is_a_protocol_error() {
        let dir = TempDir::new().unwrap();
        let setup = dispatching_backend(&dir)
            .build(&minimal_builder().build().unwrap())
            .unwrap();
        let backend = script(&dir, "echo '{}'");
        let output = dir.path().join("atom_map.png");

        let err = backend.render(&setup.atom_map, &output).unwrap_err();
        assert!(matches!(err, BackendError::Protocol(ref m) if m.contains("atom_map.png")));
        assert!(!output.exists());
    }

    #[test]
    fn error_field_becomes_remote_error() {
        let dir = TempDir::new().unwrap();
        let backend = script(&dir, r#"echo '{"error": "minimization diverged"}'"#);
        let err = backend
            .relax(
                &sample_system(Phase::Vacuum),
                &RelaxationRequest::from_config(&minimal_builder().build().unwrap()),
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Remote(ref m) if m == "minimization diverged"));
    }

    #[test]
    fn nonzero_exit_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let backend = script(&dir, "echo 'no GPU' >&2\nexit 3");
        let err = backend
            .build(&minimal_builder().build().unwrap())
            .unwrap_err();
        match err {
            BackendError::Status {
                operation, stderr, ..
            } => {
                assert_eq!(operation, "build_hybrid");
                assert_eq!(stderr, "no GPU");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn malformed_output_is_a_json_error() {
        let dir = TempDir::new().unwrap();
        let backend = script(&dir, "echo 'not json'");
        let err = backend
            .build(&minimal_builder().build().unwrap())
            .unwrap_err();
        assert!(matches!(err, BackendError::Json(_)));
    }

    #[test]
    fn inconsistent_state_is_rejected() {
        let dir = TempDir::new().unwrap();
        let backend = script(
            &dir,
            r#"echo '{"positions": [[0,0,0]], "velocities": [[0,0,0]], "forces": [[0,0,0]], "potential_energy": 0, "kinetic_energy": 0, "box_vectors": null}'"#,
        );
        let err = backend
            .relax(
                &sample_system(Phase::Vacuum),
                &RelaxationRequest::from_config(&minimal_builder().build().unwrap()),
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Protocol(_)));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let backend = ProcessBackend::new("/nonexistent/collaborator", Vec::new());
        let err = backend
            .build(&minimal_builder().build().unwrap())
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }
}

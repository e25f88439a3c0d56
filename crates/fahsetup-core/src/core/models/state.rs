use super::system::BoxVectors;
use nalgebra::{Point3, Vector3};
use std::collections::BTreeMap;

/// Snapshot of a relaxed hybrid system.
///
/// Units follow the simulation engine: nanometers, nm/ps, kJ/mol/nm, kJ/mol, ps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelaxedState {
    pub time_ps: f64,
    pub positions: Vec<Point3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub forces: Vec<Vector3<f64>>,
    pub potential_energy: f64,
    pub kinetic_energy: f64,
    pub box_vectors: Option<BoxVectors>,
    /// Context parameters (e.g. `lambda_sterics_core`) at capture time.
    pub parameters: BTreeMap<String, f64>,
}

impl RelaxedState {
    pub fn atom_count(&self) -> usize {
        self.positions.len()
    }

    /// Whether every per-atom array matches `n` atoms.
    pub fn is_consistent_with(&self, n: usize) -> bool {
        self.positions.len() == n && self.velocities.len() == n && self.forces.len() == n
    }

    /// Whether every coordinate, velocity, force, energy and box component is finite.
    pub fn is_finite(&self) -> bool {
        let vectors_finite = self
            .positions
            .iter()
            .map(|p| &p.coords)
            .chain(self.velocities.iter())
            .chain(self.forces.iter())
            .chain(self.box_vectors.iter().flatten())
            .all(|v| v.iter().all(|c| c.is_finite()));
        vectors_finite && self.potential_energy.is_finite() && self.kinetic_energy.is_finite()
    }
}

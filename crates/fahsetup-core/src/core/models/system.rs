use super::atom::AtomClass;
use super::phase::Phase;
use super::topology::HybridTopology;
use nalgebra::{Point3, Vector3};
use thiserror::Error;

/// Periodic box vectors `a`, `b`, `c` in nanometers.
pub type BoxVectors = [Vector3<f64>; 3];

#[derive(Debug, Error, PartialEq)]
pub enum HybridSystemError {
    #[error("Hybrid system for phase '{phase}' has no atoms")]
    Empty { phase: Phase },

    #[error("Hybrid system for phase '{phase}' has {actual} {what} but {expected} atoms")]
    LengthMismatch {
        phase: Phase,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Atom map entry {from} -> {to} in '{map}' is out of range for phase '{phase}'")]
    MapOutOfRange {
        phase: Phase,
        map: &'static str,
        from: usize,
        to: usize,
    },

    #[error("Hybrid system for phase '{phase}' contains non-finite coordinates")]
    NonFinite { phase: Phase },

    #[error("Serialized system for phase '{phase}' is empty")]
    MissingSystemXml { phase: Phase },
}

/// A hybrid system for one phase, as produced by the hybrid factory collaborator.
///
/// The serialized system is kept opaque: it is written verbatim to `system.xml`.
/// Everything else is structured data this crate reshapes into the other artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSystem {
    pub phase: Phase,
    /// Serialized simulation system spanning both end-states.
    pub system_xml: String,
    pub topology: HybridTopology,
    /// Initial hybrid positions in nanometers, one per atom.
    pub positions: Vec<Point3<f64>>,
    /// Periodic box vectors; `None` for non-periodic systems.
    pub box_vectors: Option<BoxVectors>,
    /// `(old index, hybrid index)` pairs.
    pub old_to_hybrid: Vec<(usize, usize)>,
    /// `(new index, hybrid index)` pairs.
    pub new_to_hybrid: Vec<(usize, usize)>,
    /// Alchemical classification of every hybrid atom.
    pub atom_classes: Vec<AtomClass>,
}

impl HybridSystem {
    pub fn atom_count(&self) -> usize {
        self.topology.atom_count()
    }

    /// Counts atoms per alchemical class as `(core, unique_old, unique_new)`.
    pub fn alchemical_counts(&self) -> (usize, usize, usize) {
        self.atom_classes
            .iter()
            .fold((0, 0, 0), |(core, old, new), class| match class {
                AtomClass::Core => (core + 1, old, new),
                AtomClass::UniqueOld => (core, old + 1, new),
                AtomClass::UniqueNew => (core, old, new + 1),
                AtomClass::Environment => (core, old, new),
            })
    }

    /// Checks the structural invariants every writer relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant: an empty system, per-atom arrays whose
    /// length differs from the atom count, map targets outside the hybrid system,
    /// non-finite coordinates, or an empty serialized system.
    pub fn validate(&self) -> Result<(), HybridSystemError> {
        let phase = self.phase;
        let n = self.atom_count();
        if n == 0 {
            return Err(HybridSystemError::Empty { phase });
        }
        if self.system_xml.trim().is_empty() {
            return Err(HybridSystemError::MissingSystemXml { phase });
        }
        if self.positions.len() != n {
            return Err(HybridSystemError::LengthMismatch {
                phase,
                what: "positions",
                expected: n,
                actual: self.positions.len(),
            });
        }
        if self.atom_classes.len() != n {
            return Err(HybridSystemError::LengthMismatch {
                phase,
                what: "atom classes",
                expected: n,
                actual: self.atom_classes.len(),
            });
        }
        for (map, pairs) in [
            ("old_to_hybrid", &self.old_to_hybrid),
            ("new_to_hybrid", &self.new_to_hybrid),
        ] {
            if let Some(&(from, to)) = pairs.iter().find(|(_, to)| *to >= n) {
                return Err(HybridSystemError::MapOutOfRange {
                    phase,
                    map,
                    from,
                    to,
                });
            }
        }

        let positions_finite = self
            .positions
            .iter()
            .all(|p| p.coords.iter().all(|c| c.is_finite()));
        let box_finite = self
            .box_vectors
            .iter()
            .flatten()
            .all(|v| v.iter().all(|c| c.is_finite()));
        if !positions_finite || !box_finite {
            return Err(HybridSystemError::NonFinite { phase });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::atom::HybridAtom;

    pub(crate) fn sample_system(phase: Phase) -> HybridSystem {
        let mut topology = HybridTopology::new();
        topology.add_atom(HybridAtom::new("C1", "C", "MOL", 1));
        topology.add_atom(HybridAtom::new("C2", "C", "MOL", 1));
        topology.add_atom(HybridAtom::new("CL3", "Cl", "MOL", 1));
        topology.add_atom(HybridAtom::new("F3", "F", "MOL", 1));
        topology.add_atom(HybridAtom::new("O", "O", "HOH", 2).with_chain('W'));
        topology.add_bond(0, 1).unwrap();
        topology.add_bond(1, 2).unwrap();
        topology.add_bond(1, 3).unwrap();

        let box_vectors = phase.is_periodic().then(|| {
            [
                Vector3::new(3.5, 0.0, 0.0),
                Vector3::new(0.0, 3.5, 0.0),
                Vector3::new(0.0, 0.0, 3.5),
            ]
        });

        HybridSystem {
            phase,
            system_xml: "<System openmmVersion=\"7.4\" type=\"System\" version=\"1\"/>\n"
                .to_string(),
            topology,
            positions: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.15, 0.0, 0.0),
                Point3::new(0.3, 0.0, 0.0),
                Point3::new(0.15, 0.14, 0.0),
                Point3::new(1.0, 1.0, 1.0),
            ],
            box_vectors,
            old_to_hybrid: vec![(0, 0), (1, 1), (2, 2)],
            new_to_hybrid: vec![(0, 0), (1, 1), (2, 3)],
            atom_classes: vec![
                AtomClass::Core,
                AtomClass::Core,
                AtomClass::UniqueOld,
                AtomClass::UniqueNew,
                AtomClass::Environment,
            ],
        }
    }

    #[test]
    fn sample_system_is_valid() {
        assert_eq!(sample_system(Phase::Solvent).validate(), Ok(()));
        assert_eq!(sample_system(Phase::Vacuum).validate(), Ok(()));
    }

    #[test]
    fn alchemical_counts_tally_each_class() {
        assert_eq!(sample_system(Phase::Solvent).alchemical_counts(), (2, 1, 1));
    }

    #[test]
    fn validate_rejects_position_count_mismatch() {
        let mut system = sample_system(Phase::Solvent);
        system.positions.pop();
        assert!(matches!(
            system.validate(),
            Err(HybridSystemError::LengthMismatch {
                what: "positions",
                expected: 5,
                actual: 4,
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_map_target() {
        let mut system = sample_system(Phase::Complex);
        system.new_to_hybrid.push((3, 42));
        assert!(matches!(
            system.validate(),
            Err(HybridSystemError::MapOutOfRange {
                map: "new_to_hybrid",
                to: 42,
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_nan_coordinates() {
        let mut system = sample_system(Phase::Solvent);
        system.positions[2].x = f64::NAN;
        assert_eq!(
            system.validate(),
            Err(HybridSystemError::NonFinite {
                phase: Phase::Solvent
            })
        );
    }

    #[test]
    fn validate_rejects_empty_system_xml() {
        let mut system = sample_system(Phase::Vacuum);
        system.system_xml = "   ".to_string();
        assert_eq!(
            system.validate(),
            Err(HybridSystemError::MissingSystemXml {
                phase: Phase::Vacuum
            })
        );
    }
}

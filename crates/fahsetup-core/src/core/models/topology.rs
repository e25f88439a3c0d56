use super::atom::HybridAtom;
use phf::{Set, phf_set};
use std::collections::HashSet;

/// Residue names treated as solvent when stripping a hybrid topology for visualization.
static SOLVENT_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "HOH", "WAT", "SOL", "H2O", "TIP", "TIP3", "TIP3P", "TIP4", "TIP4P", "TIP5", "TIP5P",
    "T3P", "T4P", "T5P", "SPC", "SPCE", "OPC",
    "NA", "NA+", "Na+", "SOD", "CL", "CL-", "Cl-", "CLA", "K", "K+", "POT",
    "LI", "LIT", "MG", "MG2", "CA", "CAL", "ZN", "ZN2", "BR", "IOD", "F", "CS", "RB",
};

/// Residue names retained by default when solvent is removed.
pub const DEFAULT_RETAINED_IONS: [&str; 2] = ["CL", "NA"];

pub fn is_solvent_residue(name: &str) -> bool {
    SOLVENT_RESIDUE_NAMES.contains(name.trim())
}

/// A bond between two hybrid atoms, stored as atom indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub atom1: usize,
    pub atom2: usize,
}

impl Bond {
    pub fn new(atom1: usize, atom2: usize) -> Self {
        Self { atom1, atom2 }
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atom1 == atom || self.atom2 == atom
    }
}

/// Atom and bond listing of a hybrid system.
///
/// Atoms are indexed by their position in `atoms`; those indices match the particle
/// indices of the serialized system and the rows of every per-atom array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridTopology {
    atoms: Vec<HybridAtom>,
    bonds: Vec<Bond>,
}

impl HybridTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, atom: HybridAtom) -> usize {
        self.atoms.push(atom);
        self.atoms.len() - 1
    }

    /// Adds a bond between two existing atoms.
    ///
    /// # Return
    ///
    /// Returns `None` if either index is out of range or the bond is a self-loop.
    pub fn add_bond(&mut self, atom1: usize, atom2: usize) -> Option<()> {
        if atom1 == atom2 || atom1 >= self.atoms.len() || atom2 >= self.atoms.len() {
            return None;
        }
        self.bonds.push(Bond::new(atom1, atom2));
        Some(())
    }

    pub fn atoms(&self) -> &[HybridAtom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&HybridAtom> {
        self.atoms.get(index)
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Returns the topology with solvent residues removed.
    ///
    /// Residue names listed in `keep` survive even when they are solvent (by default
    /// the counter-ions `CL` and `NA`). Bonds touching a removed atom are dropped and
    /// the remaining bonds are renumbered.
    ///
    /// # Return
    ///
    /// The retained original atom indices, in order, together with the new topology.
    pub fn without_solvent(&self, keep: &[&str]) -> (Vec<usize>, HybridTopology) {
        let keep: HashSet<&str> = keep.iter().map(|name| name.trim()).collect();

        let mut retained = Vec::with_capacity(self.atoms.len());
        let mut remap = vec![None; self.atoms.len()];
        let mut stripped = HybridTopology::new();

        for (index, atom) in self.atoms.iter().enumerate() {
            let name = atom.residue_name.trim();
            if is_solvent_residue(name) && !keep.contains(name) {
                continue;
            }
            remap[index] = Some(stripped.add_atom(atom.clone()));
            retained.push(index);
        }

        for bond in &self.bonds {
            if let (Some(a), Some(b)) = (remap[bond.atom1], remap[bond.atom2]) {
                stripped.bonds.push(Bond::new(a, b));
            }
        }

        (retained, stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solvated_topology() -> HybridTopology {
        let mut topology = HybridTopology::new();
        let c1 = topology.add_atom(HybridAtom::new("C1", "C", "MOL", 1));
        let c2 = topology.add_atom(HybridAtom::new("C2", "C", "MOL", 1));
        let o = topology.add_atom(HybridAtom::new("O", "O", "HOH", 2));
        let h1 = topology.add_atom(HybridAtom::new("H1", "H", "HOH", 2));
        topology.add_atom(HybridAtom::new("NA", "Na", "NA", 3));
        topology.add_atom(HybridAtom::new("CL", "Cl", "CL", 4));
        topology.add_atom(HybridAtom::new("K", "K", "K", 5));
        topology.add_bond(c1, c2).unwrap();
        topology.add_bond(o, h1).unwrap();
        topology
    }

    #[test]
    fn solvent_table_recognizes_waters_and_ions() {
        assert!(is_solvent_residue("HOH"));
        assert!(is_solvent_residue(" WAT "));
        assert!(is_solvent_residue("NA"));
        assert!(!is_solvent_residue("MOL"));
        assert!(!is_solvent_residue("ALA"));
    }

    #[test]
    fn add_bond_rejects_invalid_indices() {
        let mut topology = HybridTopology::new();
        topology.add_atom(HybridAtom::new("C1", "C", "MOL", 1));
        assert!(topology.add_bond(0, 0).is_none());
        assert!(topology.add_bond(0, 5).is_none());
        assert!(topology.bonds().is_empty());
    }

    #[test]
    fn without_solvent_keeps_default_ions_and_solute() {
        let topology = solvated_topology();
        let (retained, stripped) = topology.without_solvent(&DEFAULT_RETAINED_IONS);

        assert_eq!(retained, vec![0, 1, 4, 5]);
        let names: Vec<_> = stripped.atoms().iter().map(|a| a.residue_name.as_str()).collect();
        assert_eq!(names, vec!["MOL", "MOL", "NA", "CL"]);
    }

    #[test]
    fn without_solvent_remaps_surviving_bonds_and_drops_the_rest() {
        let topology = solvated_topology();
        let (_, stripped) = topology.without_solvent(&DEFAULT_RETAINED_IONS);
        assert_eq!(stripped.bonds(), &[Bond::new(0, 1)]);
    }

    #[test]
    fn without_solvent_with_empty_keep_list_removes_all_ions() {
        let topology = solvated_topology();
        let (retained, stripped) = topology.without_solvent(&[]);
        assert_eq!(retained, vec![0, 1]);
        assert_eq!(stripped.atom_count(), 2);
    }

    #[test]
    fn bond_contains_reports_both_endpoints() {
        let bond = Bond::new(3, 7);
        assert!(bond.contains(3));
        assert!(bond.contains(7));
        assert!(!bond.contains(4));
    }
}

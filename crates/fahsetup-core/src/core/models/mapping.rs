use std::collections::BTreeMap;

/// One ligand end-state as identified in the input ligand file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LigandRecord {
    /// Index of the molecule within the ligand file.
    pub index: usize,
    /// Title or identifier of the molecule, when the file provides one.
    pub name: String,
    /// Canonical SMILES, used by renderers and for logging.
    pub smiles: String,
}

/// Atom map between the two ligand end-states, indexed on the ligands themselves
/// (not offset by receptor or solvent atoms).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LigandAtomMap {
    pub old_ligand: LigandRecord,
    pub new_ligand: LigandRecord,
    /// New-ligand atom index to old-ligand atom index.
    pub new_to_old: BTreeMap<usize, usize>,
}

impl LigandAtomMap {
    pub fn mapped_atom_count(&self) -> usize {
        self.new_to_old.len()
    }

    /// The map inverted to old-ligand index to new-ligand index.
    pub fn old_to_new(&self) -> BTreeMap<usize, usize> {
        self.new_to_old.iter().map(|(&new, &old)| (old, new)).collect()
    }

    /// Whether no old atom is the image of two different new atoms.
    pub fn is_injective(&self) -> bool {
        self.old_to_new().len() == self.new_to_old.len()
    }
}

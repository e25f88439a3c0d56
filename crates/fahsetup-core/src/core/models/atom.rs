use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Classification of a hybrid atom with respect to the alchemical transformation.
///
/// The hybrid topology spans both ligand end-states. Atoms present in only one
/// end-state are annihilated or created as `lambda` moves, atoms shared by the mapped
/// ligand cores change parameters, and everything else (protein, solvent, ions) is
/// untouched environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(i8)]
pub enum AtomClass {
    /// Atom outside the alchemical region.
    #[default]
    Environment = 0,
    /// Mapped ligand atom present in both end-states.
    Core = 1,
    /// Ligand atom present only in the old end-state.
    UniqueOld = 2,
    /// Ligand atom present only in the new end-state.
    UniqueNew = 3,
}

impl AtomClass {
    /// Numeric code stored in the serialized hybrid factory arrays.
    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn is_alchemical(self) -> bool {
        !matches!(self, AtomClass::Environment)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid atom class: '{0}'")]
pub struct ParseAtomClassError(pub String);

impl FromStr for AtomClass {
    type Err = ParseAtomClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "environment" | "env" => Ok(AtomClass::Environment),
            "core" => Ok(AtomClass::Core),
            "unique_old" | "unique-old" | "uniqueold" => Ok(AtomClass::UniqueOld),
            "unique_new" | "unique-new" | "uniquenew" => Ok(AtomClass::UniqueNew),
            _ => Err(ParseAtomClassError(s.to_string())),
        }
    }
}

impl fmt::Display for AtomClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AtomClass::Environment => "environment",
            AtomClass::Core => "core",
            AtomClass::UniqueOld => "unique_old",
            AtomClass::UniqueNew => "unique_new",
        })
    }
}

/// An atom of the hybrid topology.
///
/// Fields follow the per-atom columns of a trajectory topology table so that the
/// topology can be written both as a PDB file and as a structured NumPy array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridAtom {
    /// Atom name (e.g., "CA", "C12").
    pub name: String,
    /// Element symbol (e.g., "C", "Cl"). Empty for virtual sites.
    pub element: String,
    /// Three-letter residue name (e.g., "ALA", "MOL", "HOH").
    pub residue_name: String,
    /// Residue sequence number as found in the source structure.
    pub residue_seq: i32,
    /// Single-character chain identifier.
    pub chain_id: char,
    /// Segment identifier, frequently empty.
    pub segment_id: String,
}

impl HybridAtom {
    pub fn new(name: &str, element: &str, residue_name: &str, residue_seq: i32) -> Self {
        Self {
            name: name.to_string(),
            element: element.to_string(),
            residue_name: residue_name.to_string(),
            residue_seq,
            chain_id: 'A',
            segment_id: String::new(),
        }
    }

    pub fn with_chain(mut self, chain_id: char) -> Self {
        self.chain_id = chain_id;
        self
    }
}

/// Provenance record stored next to every run (`references.npy`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct References {
    pub start_ligand: usize,
    pub end_ligand: usize,
    pub protein_pdb: Option<String>,
    pub passed_structure_relax: bool,
}

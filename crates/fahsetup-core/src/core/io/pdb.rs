use super::traits::Artifact;
use crate::core::models::system::BoxVectors;
use crate::core::models::topology::HybridTopology;
use nalgebra::{Point3, Vector3};
use phf::{Set, phf_set};
use std::collections::BTreeMap;
use std::io::{self, Write};
use thiserror::Error;

const ANGSTROMS_PER_NANOMETER: f64 = 10.0;
const MAX_SERIAL: usize = 99_999;

/// Residues written as `ATOM` records; everything else is `HETATM`.
static POLYMER_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "ALA", "ARG", "ASN", "ASP", "CYS", "GLN", "GLU", "GLY", "HIS", "ILE",
    "LEU", "LYS", "MET", "PHE", "PRO", "SER", "THR", "TRP", "TYR", "VAL",
    "ASH", "GLH", "HID", "HIE", "HIP", "LYN", "CYX", "CYM", "ACE", "NME", "NH2",
};

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Topology has {atoms} atoms but {positions} positions were given")]
    LengthMismatch { atoms: usize, positions: usize },
}

/// A PDB snapshot of a topology at the given positions (in nanometers).
pub struct PdbFile<'a> {
    pub topology: &'a HybridTopology,
    pub positions: &'a [Point3<f64>],
    pub box_vectors: Option<&'a BoxVectors>,
}

impl<'a> PdbFile<'a> {
    pub fn new(
        topology: &'a HybridTopology,
        positions: &'a [Point3<f64>],
        box_vectors: Option<&'a BoxVectors>,
    ) -> Result<Self, PdbError> {
        if topology.atom_count() != positions.len() {
            return Err(PdbError::LengthMismatch {
                atoms: topology.atom_count(),
                positions: positions.len(),
            });
        }
        Ok(Self {
            topology,
            positions,
            box_vectors,
        })
    }
}

/// Cell lengths (Å) and angles (degrees) spanned by three box vectors given in nm.
fn unit_cell(box_vectors: &BoxVectors) -> ([f64; 3], [f64; 3]) {
    let [a, b, c] = box_vectors.map(|v: Vector3<f64>| v * ANGSTROMS_PER_NANOMETER);
    let angle = |u: &Vector3<f64>, v: &Vector3<f64>| u.angle(v).to_degrees();
    (
        [a.norm(), b.norm(), c.norm()],
        [angle(&b, &c), angle(&a, &c), angle(&a, &b)],
    )
}

/// Pads names shorter than four characters so that one-letter elements line up in
/// column 14.
fn aligned_name(name: &str, element: &str) -> String {
    if name.len() < 4 && element.len() <= 1 {
        format!(" {:<3}", name)
    } else {
        format!("{:<4}", name)
    }
}

fn serial_of(index: usize) -> usize {
    (index % MAX_SERIAL) + 1
}

impl Artifact for PdbFile<'_> {
    type Error = PdbError;

    fn write_to(&self, writer: &mut impl Write) -> Result<(), PdbError> {
        writeln!(
            writer,
            "REMARK   1 CREATED WITH FAHSETUP {}",
            env!("CARGO_PKG_VERSION")
        )?;

        if let Some(box_vectors) = self.box_vectors {
            let ([a, b, c], [alpha, beta, gamma]) = unit_cell(box_vectors);
            writeln!(
                writer,
                "CRYST1{:>9.3}{:>9.3}{:>9.3}{:>7.2}{:>7.2}{:>7.2} P 1           1",
                a, b, c, alpha, beta, gamma
            )?;
        }

        let atoms = self.topology.atoms();
        let mut hetero = vec![false; atoms.len()];
        let mut previous_chain = None;

        for (index, (atom, position)) in atoms.iter().zip(self.positions).enumerate() {
            if previous_chain.is_some_and(|chain| chain != atom.chain_id) {
                writeln!(writer, "TER")?;
            }
            previous_chain = Some(atom.chain_id);

            let record = if POLYMER_RESIDUE_NAMES.contains(atom.residue_name.as_str()) {
                "ATOM"
            } else {
                hetero[index] = true;
                "HETATM"
            };
            let p = position.coords * ANGSTROMS_PER_NANOMETER;
            writeln!(
                writer,
                "{:<6}{:>5} {} {:>3} {:1}{:>4}    {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}",
                record,
                serial_of(index),
                aligned_name(&atom.name, &atom.element),
                atom.residue_name,
                atom.chain_id,
                atom.residue_seq % 10_000,
                p.x,
                p.y,
                p.z,
                1.0,
                0.0,
                atom.element.to_uppercase(),
            )?;
        }
        if previous_chain.is_some() {
            writeln!(writer, "TER")?;
        }

        let mut connections: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for bond in self.topology.bonds() {
            if hetero[bond.atom1] || hetero[bond.atom2] {
                connections.entry(bond.atom1).or_default().push(bond.atom2);
                connections.entry(bond.atom2).or_default().push(bond.atom1);
            }
        }
        for (atom, mut partners) in connections {
            partners.sort_unstable();
            for chunk in partners.chunks(4) {
                write!(writer, "CONECT{:>5}", serial_of(atom))?;
                for &partner in chunk {
                    write!(writer, "{:>5}", serial_of(partner))?;
                }
                writeln!(writer)?;
            }
        }

        writeln!(writer, "END")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::HybridAtom;

    fn peptide_and_ligand() -> (HybridTopology, Vec<Point3<f64>>) {
        let mut topology = HybridTopology::new();
        topology.add_atom(HybridAtom::new("CA", "C", "ALA", 1));
        topology.add_atom(HybridAtom::new("C1", "C", "MOL", 2).with_chain('B'));
        topology.add_atom(HybridAtom::new("CL1", "Cl", "MOL", 2).with_chain('B'));
        topology.add_bond(1, 2).unwrap();
        let positions = vec![
            Point3::new(0.1, 0.2, 0.3),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.15, 0.0, 0.0),
        ];
        (topology, positions)
    }

    fn render(pdb: &PdbFile) -> String {
        let mut buf = Vec::new();
        pdb.write_to(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn records_use_angstroms_and_fixed_columns() {
        let (topology, positions) = peptide_and_ligand();
        let text = render(&PdbFile::new(&topology, &positions, None).unwrap());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[1],
            "ATOM      1  CA  ALA A   1       1.000   2.000   3.000  1.00  0.00           C"
        );
        assert_eq!(lines[2], "TER");
        assert!(lines[3].starts_with("HETATM    2  C1  MOL B   2      10.000"));
        assert!(lines[4].starts_with("HETATM    3 CL1  MOL B   2      11.500"));
        assert!(lines[4].ends_with("CL"));
        assert_eq!(lines[5], "TER");
        assert_eq!(lines[6], "CONECT    2    3");
        assert_eq!(lines[7], "CONECT    3    2");
        assert_eq!(lines.last(), Some(&"END"));
    }

    #[test]
    fn cryst1_describes_orthorhombic_box() {
        let (topology, positions) = peptide_and_ligand();
        let box_vectors = [
            Vector3::new(3.0, 0.0, 0.0),
            Vector3::new(0.0, 4.0, 0.0),
            Vector3::new(0.0, 0.0, 5.0),
        ];
        let text = render(&PdbFile::new(&topology, &positions, Some(&box_vectors)).unwrap());
        assert!(text.contains(
            "CRYST1   30.000   40.000   50.000  90.00  90.00  90.00 P 1           1"
        ));
    }

    #[test]
    fn nonperiodic_snapshot_has_no_cryst1() {
        let (topology, positions) = peptide_and_ligand();
        let text = render(&PdbFile::new(&topology, &positions, None).unwrap());
        assert!(!text.contains("CRYST1"));
    }

    #[test]
    fn position_count_must_match_topology() {
        let (topology, mut positions) = peptide_and_ligand();
        positions.pop();
        assert!(matches!(
            PdbFile::new(&topology, &positions, None),
            Err(PdbError::LengthMismatch {
                atoms: 3,
                positions: 2
            })
        ));
    }
}
